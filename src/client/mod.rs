//! Recorder-side components: the service API client, the action relay,
//! and the recording session state machine.

pub mod api;
pub mod relay;
pub mod session;

pub use api::HttpApiClient;
pub use relay::{Action, ActionResponse, RelayHandle};
pub use session::{RecordingSession, SessionPolicy};
