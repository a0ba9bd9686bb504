use core::convert::Infallible;

use embassy_sync::{blocking_mutex::raw::RawMutex, channel};

use crate::message::Message;

/// Where a [`Client`](super::Client) gets its inbound messages from. The
/// transport behind it is responsible for reassembly and decoding.
pub trait MessageSource {
    type Error;

    async fn receive(&mut self) -> Result<Message, Self::Error>;
}

impl<T> MessageSource for &mut T
where
    T: MessageSource,
{
    type Error = T::Error;

    async fn receive(&mut self) -> Result<Message, Self::Error> {
        (*self).receive().await
    }
}

impl<M, const N: usize> MessageSource for channel::Receiver<'_, M, Message, N>
where
    M: RawMutex,
{
    type Error = Infallible;

    async fn receive(&mut self) -> Result<Message, Self::Error> {
        Ok(channel::Receiver::receive(self).await)
    }
}
