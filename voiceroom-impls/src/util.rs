/// Sends a value to every subscriber, forgetting the ones that went away.
pub(crate) fn broadcast<T: Clone>(
    subscribers: &mut Vec<tokio::sync::mpsc::UnboundedSender<T>>,
    value: &T,
) {
    subscribers.retain(|s| s.send(value.clone()).is_ok());
}
