//! Test fixture lifecycle: reserve, launch, wait, tear down.
//!
//! A [`Fixture`] owns a reserved block and the service started on it. The
//! service is only handed to the caller once a readiness probe has completed
//! against it. Any failure along the way shuts down what was started and
//! releases the block before the error is returned.

use std::sync::Arc;

use crate::cancel::{CancelToken, Sleeper};
use crate::error::{Error, Result};
use crate::port::allocator::BlockAllocator;
use crate::port::lease::PortLease;
use crate::port::listeners::ListenerSource;
use crate::port::registry::ReservationRegistry;
use crate::readiness::{Endpoint, ReadinessPoller, ReadinessProbe, ReadyReport};
use crate::{Port, PortRange};

/// Error type returned by launchers and services.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A service started on a reserved block.
pub trait RunningService: Send {
    /// The endpoint readiness is probed on, normally the block's first port.
    fn endpoint(&self) -> Endpoint;

    /// Every port the service has bound. Ports outside the reserved block are
    /// released too on teardown.
    fn bound_ports(&self) -> Vec<Port>;

    /// Stops the service.
    ///
    /// # Errors
    ///
    /// Returns the service's error if it could not stop cleanly.
    fn shutdown(&mut self) -> std::result::Result<(), BoxError>;
}

/// Starts a service on a reserved block.
pub trait ServiceLauncher {
    /// The service type this launcher starts.
    type Service: RunningService;

    /// Starts the service so that it uses ports of `block`.
    ///
    /// # Errors
    ///
    /// Returns the launcher's error if the service could not be started.
    fn launch(&self, block: &PortRange) -> std::result::Result<Self::Service, BoxError>;
}

/// A ready service together with the ports it was given.
///
/// Dropping a fixture tears it down; call [`teardown`](Self::teardown) to
/// observe shutdown errors.
#[derive(Debug)]
pub struct Fixture<R: RunningService> {
    service: Option<R>,
    endpoint: Endpoint,
    lease: Option<PortLease>,
    registry: Arc<ReservationRegistry>,
    report: ReadyReport,
}

impl<R: RunningService> Fixture<R> {
    /// Reserves `count` ports, launches a service on them and waits until it
    /// is ready.
    ///
    /// # Errors
    ///
    /// - any allocation error, such as [`Error::WindowExhausted`]
    /// - [`Error::ServiceLaunch`] if the launcher fails
    /// - any readiness error, such as [`Error::ReadinessTimeout`]
    ///
    /// Nothing stays reserved or running when an error is returned.
    pub fn start<L, S, P, T, X>(
        allocator: &BlockAllocator<L, S>,
        poller: &ReadinessPoller<P, T>,
        launcher: &X,
        count: u16,
        cancel: &CancelToken,
    ) -> Result<Self>
    where
        L: ListenerSource,
        S: Sleeper,
        P: ReadinessProbe,
        T: Sleeper,
        X: ServiceLauncher<Service = R>,
    {
        let lease = allocator.lease(count, cancel)?;
        let block = lease.block();

        let service = launcher
            .launch(&block)
            .map_err(|source| Error::ServiceLaunch { block, source })?;

        let endpoint = service.endpoint();
        let mut fixture = Self {
            service: Some(service),
            endpoint: endpoint.clone(),
            lease: Some(lease),
            registry: Arc::clone(allocator.registry()),
            report: ReadyReport {
                attempts: 0,
                elapsed: std::time::Duration::ZERO,
            },
        };

        match poller.wait_until_ready(&endpoint, cancel) {
            Ok(report) => {
                log::debug!("fixture on {block} ready at {endpoint}");
                fixture.report = report;
                Ok(fixture)
            }
            Err(err) => {
                if let Err(shutdown_err) = fixture.shut_down() {
                    log::warn!("{shutdown_err}");
                }
                Err(err)
            }
        }
    }

    /// The reserved block.
    #[must_use]
    pub fn block(&self) -> Option<PortRange> {
        self.lease.as_ref().map(PortLease::block)
    }

    /// The endpoint readiness was established on.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The running service.
    #[must_use]
    pub fn service(&self) -> Option<&R> {
        self.service.as_ref()
    }

    /// How readiness was established.
    #[must_use]
    pub fn ready_report(&self) -> ReadyReport {
        self.report
    }

    /// Stops the service and releases every port it held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] if the service failed to stop. The
    /// ports are released regardless.
    pub fn teardown(mut self) -> Result<()> {
        self.shut_down()
    }

    fn shut_down(&mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(mut service) = self.service.take() {
            let extra = service.bound_ports();
            if let Err(source) = service.shutdown() {
                result = Err(Error::ServiceShutdown {
                    endpoint: self.endpoint.clone(),
                    source,
                });
            }
            for port in extra {
                self.registry.release(port);
            }
        }

        if let Some(lease) = self.lease.take() {
            lease.release();
        }

        result
    }
}

impl<R: RunningService> Drop for Fixture<R> {
    fn drop(&mut self) {
        if let Err(err) = self.shut_down() {
            log::warn!("fixture teardown: {err}");
        }
    }
}
