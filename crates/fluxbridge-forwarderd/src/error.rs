use fluxbridge_core::bus::BusError;
use fluxbridge_services::EndpointError;

#[derive(thiserror::Error, Debug)]
pub enum ForwarderError {
    #[error("no bindings registered")]
    NoBindings,
    #[error("binding {topic}/{channel} failed to initialize: {source}")]
    InitFailed {
        topic: String,
        channel: String,
        #[source]
        source: EndpointError,
    },
    #[error("binding {topic}/{channel} could not subscribe to the bus: {source}")]
    SubscribeFailed {
        topic: String,
        channel: String,
        #[source]
        source: BusError,
    },
}
