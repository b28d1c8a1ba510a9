//! Business logic services

pub mod audit;
pub mod availability;
pub mod borrowers;
pub mod fulfillment;
pub mod inventory;
pub mod loans;
pub mod notifications;
pub mod reservations;

use std::sync::Arc;

use crate::{
    config::{CirculationConfig, EmailConfig},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub availability: availability::AvailabilityService,
    pub inventory: inventory::InventoryService,
    pub borrowers: borrowers::BorrowersService,
    pub reservations: reservations::ReservationsService,
    pub fulfillment: fulfillment::FulfillmentService,
    pub loans: loans::LoansService,
    pub audit: audit::AuditService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        circulation: CirculationConfig,
        email: EmailConfig,
    ) -> Self {
        let notifier: Arc<dyn notifications::Notifier> = if email.enabled {
            Arc::new(notifications::EmailNotifier::new(email))
        } else {
            Arc::new(notifications::NullNotifier)
        };

        let reservations = reservations::ReservationsService::new(
            repository.clone(),
            circulation.clone(),
            notifier.clone(),
        );

        Self {
            availability: availability::AvailabilityService::new(
                repository.clone(),
                circulation.clone(),
            ),
            inventory: inventory::InventoryService::new(repository.clone(), circulation.clone()),
            borrowers: borrowers::BorrowersService::new(repository.clone()),
            fulfillment: fulfillment::FulfillmentService::new(
                repository.clone(),
                circulation.clone(),
                notifier.clone(),
            ),
            loans: loans::LoansService::new(repository.clone(), circulation, notifier),
            audit: audit::AuditService::new(repository, reservations.clone()),
            reservations,
        }
    }
}
