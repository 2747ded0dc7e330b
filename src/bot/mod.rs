/// Dispatcher endpoints for commands, messages and button presses
pub mod handlers;
/// Telegram delivery with retries
pub mod resilient;
/// Prompt rendering
pub mod views;
