/// Relay behavior options.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelayOptions {
    /// Bounded event buffer between the transport task and the consumer.
    pub event_buffer_capacity: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            event_buffer_capacity: 128,
        }
    }
}

impl RelayOptions {
    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }
}
