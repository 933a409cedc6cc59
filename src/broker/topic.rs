use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::transport::TopicReader;
use crate::utils::ShutdownTrigger;

/// A live subscription of a [`super::BrokerClient`] to one topic.
///
/// The reader is owned here so it can be closed from outside the loop; the
/// handler lives inside the loop task and is dropped with it.
pub(crate) struct Subscription {
    pub(crate) reader: Arc<dyn TopicReader>,
    pub(crate) stop: ShutdownTrigger,
    pub(crate) task: JoinHandle<()>,
}
