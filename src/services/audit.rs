//! Consistency auditor/repairer.
//!
//! Recomputes every invariant from loan/reservation facts using the same
//! formulas as the live paths (`availability::compute_available`, the queue
//! renumbering), so a clean database always reports zero issues and a fix
//! run followed by a check run comes back empty. Corrections happen only
//! here, never on the hot path, and each one is reported with its
//! before/after values.

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::audit::{AuditIssue, AuditReport, IssueKind, Severity},
    repository::Repository,
    services::{availability, reservations::ReservationsService},
};

/// Classify a stored counter against its recomputed value. Negative and
/// overflowing values are invariant violations; a merely outdated value is
/// a warning.
pub fn classify_counter(stored: i16, computed: i16, total: i16) -> Option<(IssueKind, Severity)> {
    if stored < 0 {
        Some((IssueKind::NegativeAvailableCopies, Severity::Error))
    } else if stored > total {
        Some((IssueKind::AvailableExceedsTotal, Severity::Error))
    } else if stored != computed {
        Some((IssueKind::StaleAvailableCopies, Severity::Warning))
    } else {
        None
    }
}

/// Whether an ascending priority list deviates from `{1..N}`
pub fn sequence_is_broken(priorities: &[i16]) -> bool {
    priorities
        .iter()
        .enumerate()
        .any(|(index, priority)| *priority != index as i16 + 1)
}

#[derive(Clone)]
pub struct AuditService {
    repository: Repository,
    reservations: ReservationsService,
}

impl AuditService {
    pub fn new(repository: Repository, reservations: ReservationsService) -> Self {
        Self { repository, reservations }
    }

    /// One audit pass over the whole store. With `auto_fix` the detected
    /// issues are corrected in the order that makes a single pass converge:
    /// orphans first, then lapsed reservations, then priority sequences,
    /// and the counters last.
    pub async fn run(&self, auto_fix: bool) -> AppResult<AuditReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, auto_fix, "consistency audit started");

        let mut issues = Vec::new();
        self.sweep_orphaned_loans(auto_fix, &mut issues).await?;
        self.sweep_orphaned_reservations(auto_fix, &mut issues).await?;
        self.sweep_lapsed_reservations(auto_fix, &mut issues).await?;
        self.sweep_priority_sequences(auto_fix, &mut issues).await?;
        let documents_checked = self.sweep_counter_drift(auto_fix, &mut issues).await?;

        let report = AuditReport {
            run_id,
            auto_fix,
            started_at,
            finished_at: Utc::now(),
            documents_checked,
            issues,
        };
        tracing::info!(
            %run_id,
            issues = report.issues.len(),
            documents = documents_checked,
            "consistency audit finished"
        );
        Ok(report)
    }

    /// Loan rows pointing at a document or borrower that no longer exists.
    /// The fix deletes the row; a substitute reference is never invented.
    async fn sweep_orphaned_loans(
        &self,
        auto_fix: bool,
        issues: &mut Vec<AuditIssue>,
    ) -> AppResult<()> {
        for loan in self.repository.loans.orphaned().await? {
            let mut fixed = false;
            if auto_fix {
                self.repository.loans.delete(&self.repository.pool, loan.id).await?;
                fixed = true;
            }
            issues.push(AuditIssue {
                kind: IssueKind::OrphanedLoan,
                severity: Severity::Error,
                document_id: Some(loan.document_id),
                record_id: Some(loan.id),
                stored: Some(format!(
                    "document {} / borrower {}",
                    loan.document_id, loan.borrower_id
                )),
                computed: None,
                detail: "loan references a document or borrower that no longer exists".to_string(),
                fixed,
            });
        }
        Ok(())
    }

    async fn sweep_orphaned_reservations(
        &self,
        auto_fix: bool,
        issues: &mut Vec<AuditIssue>,
    ) -> AppResult<()> {
        for reservation in self.repository.reservations.orphaned().await? {
            let mut fixed = false;
            if auto_fix {
                self.repository
                    .reservations
                    .delete(&self.repository.pool, reservation.id)
                    .await?;
                fixed = true;
            }
            issues.push(AuditIssue {
                kind: IssueKind::OrphanedReservation,
                severity: Severity::Error,
                document_id: Some(reservation.document_id),
                record_id: Some(reservation.id),
                stored: Some(format!(
                    "document {} / borrower {}",
                    reservation.document_id, reservation.borrower_id
                )),
                computed: None,
                detail: "reservation references a document or borrower that no longer exists"
                    .to_string(),
                fixed,
            });
        }
        Ok(())
    }

    /// Active reservations whose grace window has lapsed. The fix reuses the
    /// queue manager's removal path, so the renumbering and counter refresh
    /// ride the same transaction as the status flip.
    async fn sweep_lapsed_reservations(
        &self,
        auto_fix: bool,
        issues: &mut Vec<AuditIssue>,
    ) -> AppResult<()> {
        let now = Utc::now();
        for id in self.repository.reservations.lapsed_active_ids(now).await? {
            let reservation = self.repository.reservations.get(id).await?;
            let mut fixed = false;
            if auto_fix {
                match self.reservations.expire_one(id, now).await {
                    Ok(_) => fixed = true,
                    // Raced with a cancel or fulfillment; already resolved
                    Err(AppError::Admission(ErrorCode::ReservationNotActive, _)) => continue,
                    Err(err) => return Err(err),
                }
            }
            issues.push(AuditIssue {
                kind: IssueKind::ExpiredReservation,
                severity: Severity::Warning,
                document_id: Some(reservation.document_id),
                record_id: Some(id),
                stored: Some("active".to_string()),
                computed: Some("expired".to_string()),
                detail: format!(
                    "reservation lapsed at {}",
                    reservation.expiry_date.format("%Y-%m-%d %H:%M")
                ),
                fixed,
            });
        }
        Ok(())
    }

    /// Per-document check that active priorities form `{1..N}`
    async fn sweep_priority_sequences(
        &self,
        auto_fix: bool,
        issues: &mut Vec<AuditIssue>,
    ) -> AppResult<()> {
        let active = self.repository.reservations.all_active_ordered().await?;

        let mut current_document: Option<i32> = None;
        let mut priorities: Vec<i16> = Vec::new();
        let mut groups: Vec<(i32, Vec<i16>)> = Vec::new();
        for reservation in active {
            if current_document != Some(reservation.document_id) {
                if let Some(doc) = current_document {
                    groups.push((doc, std::mem::take(&mut priorities)));
                }
                current_document = Some(reservation.document_id);
            }
            priorities.push(reservation.priority_order);
        }
        if let Some(doc) = current_document {
            groups.push((doc, priorities));
        }

        for (document_id, priorities) in groups {
            if !sequence_is_broken(&priorities) {
                continue;
            }
            let expected: Vec<i16> = (1..=priorities.len() as i16).collect();
            let mut fixed = false;
            if auto_fix {
                fixed = self.resequence_document(document_id).await?;
            }
            issues.push(AuditIssue {
                kind: IssueKind::PrioritySequenceBroken,
                severity: Severity::Error,
                document_id: Some(document_id),
                record_id: None,
                stored: Some(format!("{:?}", priorities)),
                computed: Some(format!("{:?}", expected)),
                detail: "active reservation priorities have gaps or duplicates".to_string(),
                fixed,
            });
        }
        Ok(())
    }

    async fn resequence_document(&self, document_id: i32) -> AppResult<bool> {
        let mut tx = self.repository.pool.begin().await?;
        // Orphaned active reservations can name a missing document; leave
        // those to the orphan sweep
        match self.repository.documents.lock(&mut *tx, document_id).await {
            Ok(_) => {}
            Err(AppError::NotFound(..)) => return Ok(false),
            Err(err) => return Err(err),
        }
        self.repository.reservations.resequence(&mut *tx, document_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Stored counters vs the value recomputed from live loan and
    /// reservation rows. Returns how many documents were checked.
    async fn sweep_counter_drift(
        &self,
        auto_fix: bool,
        issues: &mut Vec<AuditIssue>,
    ) -> AppResult<i64> {
        let documents = self.repository.documents.all().await?;
        let checked = documents.len() as i64;

        for document in documents {
            let pool = &self.repository.pool;
            let active_loans = self
                .repository
                .loans
                .active_count_for_document(pool, document.id)
                .await?;
            let active_reservations = self
                .repository
                .reservations
                .active_count_for_document(pool, document.id)
                .await?;
            let computed = availability::compute_available(
                document.total_copies,
                active_loans,
                active_reservations,
            );

            let Some((kind, severity)) =
                classify_counter(document.available_copies, computed, document.total_copies)
            else {
                continue;
            };

            let mut fixed = false;
            if auto_fix {
                let mut tx = self.repository.pool.begin().await?;
                let locked = self.repository.documents.lock(&mut *tx, document.id).await?;
                availability::refresh_stored(&self.repository, &mut tx, &locked).await?;
                tx.commit().await?;
                fixed = true;
            }
            issues.push(AuditIssue {
                kind,
                severity,
                document_id: Some(document.id),
                record_id: None,
                stored: Some(document.available_copies.to_string()),
                computed: Some(computed.to_string()),
                detail: format!(
                    "stored availability disagrees with {} active loans and {} active reservations over {} copies",
                    active_loans, active_reservations, document.total_copies
                ),
                fixed,
            });
        }
        Ok(checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counters_are_flagged_as_errors() {
        assert_eq!(
            classify_counter(-2, 0, 1),
            Some((IssueKind::NegativeAvailableCopies, Severity::Error))
        );
    }

    #[test]
    fn overflowing_counters_are_flagged_as_errors() {
        assert_eq!(
            classify_counter(5, 3, 3),
            Some((IssueKind::AvailableExceedsTotal, Severity::Error))
        );
    }

    #[test]
    fn stale_counters_are_warnings() {
        assert_eq!(
            classify_counter(1, 0, 3),
            Some((IssueKind::StaleAvailableCopies, Severity::Warning))
        );
    }

    #[test]
    fn matching_counters_are_clean() {
        assert_eq!(classify_counter(2, 2, 3), None);
    }

    #[test]
    fn gap_free_sequences_pass() {
        assert!(!sequence_is_broken(&[]));
        assert!(!sequence_is_broken(&[1]));
        assert!(!sequence_is_broken(&[1, 2, 3]));
    }

    #[test]
    fn gaps_duplicates_and_wrong_starts_are_broken() {
        assert!(sequence_is_broken(&[2]));
        assert!(sequence_is_broken(&[1, 3]));
        assert!(sequence_is_broken(&[1, 2, 2]));
        assert!(sequence_is_broken(&[0, 1, 2]));
    }
}
