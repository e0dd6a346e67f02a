//! Tools bundled with the server.

mod countdown;
mod echo;
mod fetch;

pub use countdown::Countdown;
pub use echo::Echo;
pub use fetch::Fetch;

use crate::mcp::ToolRegistry;

/// Register every built-in tool.
pub fn register_builtin(registry: &mut ToolRegistry) {
    registry.register(Echo);
    registry.register(Countdown);
    registry.register(Fetch::default());
}
