pub mod noop;
pub mod sqllite;
use std::error::Error;

use async_trait::async_trait;

use keysync_domain::event::ExchangeEvent;

#[async_trait]
pub trait EventSink: Send {
    async fn save(&mut self, events: &[ExchangeEvent]) -> Result<(), Box<dyn Error>>;
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>>;
}
