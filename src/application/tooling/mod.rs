mod error;
mod interface;
mod process;

pub use error::ToolInvokeError;
pub use interface::{ToolDescriptor, ToolTransport};
pub use process::{HostConfig, HostProcess};
