//! Runs a [`Device`] on an embassy executor: inbound messages come from a
//! [`MessageSource`], timers are embassy [`Timer`]s, and outbound messages go
//! through the device's [`Host`].

use core::{
    future::{pending, Future},
    pin::pin,
};

use embassy_futures::select::{select, Either};
use embassy_time::{Instant, Timer};

use crate::{
    device::{Device, Host},
    registry::Registry,
};

mod source;

pub use source::MessageSource;

pub struct Client<R, H, S> {
    device: Device<R, H>,
    source: S,
}

impl<R, H, S> Client<R, H, S>
where
    R: Registry,
    H: Host,
    S: MessageSource,
{
    pub fn new(device: Device<R, H>, source: S) -> Self {
        Self { device, source }
    }

    pub fn device(&self) -> &Device<R, H> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<R, H> {
        &mut self.device
    }

    pub fn into_inner(self) -> (Device<R, H>, S) {
        (self.device, self.source)
    }

    /// Start the device if needed, then wait for the next timer or inbound
    /// message and handle it. Only errors from the source are returned.
    pub async fn poll(&mut self) -> Result<(), S::Error> {
        if let Err(_err) = self.device.start(Instant::now()) {
            error!("failed to start: {}", _err.kind());
        }

        let deadline = self.device.next_deadline();
        let timer = async move {
            match deadline {
                Some(at) => Timer::at(at).await,
                None => pending::<()>().await,
            }
        };

        let next = select(timer, self.source.receive()).await;

        match next {
            Either::First(()) => {
                if let Err(_err) = self.device.poll(Instant::now()) {
                    error!("timer work failed: {}", _err.kind());
                }
            }
            Either::Second(message) => {
                self.device.deliver(&message?, Instant::now());
            }
        }

        Ok(())
    }

    /// Poll until `stop` resolves, then shut the device down.
    pub async fn run(&mut self, stop: impl Future) -> Result<(), S::Error> {
        let mut stop = pin!(stop);

        loop {
            let next = select(self.poll(), stop.as_mut()).await;

            match next {
                Either::First(res) => res?,
                Either::Second(_) => {
                    debug!("stopping");
                    self.device.shutdown();
                    return Ok(());
                }
            }
        }
    }
}
