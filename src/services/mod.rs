//! Business logic services

pub mod catalog;
pub mod catalog_lookup;
pub mod clock;
pub mod loans;
pub mod sweeper;
pub mod users;

use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use crate::{config::AppConfig, repository::Store};
use catalog_lookup::CatalogLookup;
use clock::Clock;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
    pub lookup: Arc<dyn CatalogLookup>,
}

impl Services {
    /// Create all services over one store
    pub fn new(
        store: Arc<dyn Store>,
        lookup: Arc<dyn CatalogLookup>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            catalog: catalog::CatalogService::new(store.clone(), lookup.clone()),
            loans: loans::LoansService::new(store.clone(), clock.clone(), config.lending.reservation_days),
            users: users::UsersService::new(store, clock, config.auth.clone(), config.passwords.clone()),
            lookup,
        }
    }

    /// Start the background expiry sweep
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        sweeper::spawn(self.loans.clone(), every)
    }
}
