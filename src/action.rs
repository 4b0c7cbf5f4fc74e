//! The [`Action`] trait and the [`Context`] actions receive when a rule fires.

use crate::controller::ControllerInput;
use crate::template::Bindings;
use crate::writer::PtyWriter;
use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

/// Execution context passed to [`Action::execute`].
///
/// Actions never touch the session or the controller directly: they request
/// writes through the handles lent to them here by the engine.
pub struct Context<'a> {
    terminal: &'a PtyWriter,
    controller: Option<&'a mut ControllerInput>,
}

impl<'a> Context<'a> {
    pub fn new(terminal: &'a PtyWriter, controller: Option<&'a mut ControllerInput>) -> Self {
        Self {
            terminal,
            controller,
        }
    }

    /// Request one atomic write of `data` to the shell's input.
    pub fn write_to_pty(&self, data: &[u8]) -> Result<()> {
        self.terminal.send(data)
    }

    /// Send one newline-terminated message to the controller.
    ///
    /// Without a controller the message is dropped.
    pub async fn send_to_controller(&mut self, line: &str) -> Result<()> {
        match self.controller.as_deref_mut() {
            Some(controller) => controller.send(line).await,
            None => {
                warn!(message = line, "No controller configured, dropping message");
                Ok(())
            }
        }
    }
}

/// What a rule does once its template matches.
///
/// Implement this trait to add an action kind. Then:
///
/// 1. Define `pub const NAME: &'static str` on your struct; it is the word
///    after `!` on an action line (e.g. `"terminal"`).
/// 2. Re-export the struct from `src/actions/mod.rs`.
/// 3. Add one entry to the `REGISTRY` in [`crate::parser`]:
///    `(MyAction::NAME, MyAction::parse_boxed)`.
#[async_trait(?Send)]
pub trait Action: 'static {
    /// The action kind, accessible at runtime through a trait object.
    fn name(&self) -> &'static str;

    /// Parse this action from its argument string (everything after the kind
    /// on the action line, quotes included).
    fn parse(args: &str) -> Result<Self>
    where
        Self: Sized;

    /// Parse and box this action. Used as the function-pointer type stored in
    /// the action registry.
    fn parse_boxed(args: &str) -> Result<Box<dyn Action>>
    where
        Self: Sized,
    {
        Ok(Box::new(Self::parse(args)?))
    }

    /// Variable names the action needs bound by its rule's template.
    fn references(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Run the action with the bindings of one match.
    async fn execute(&self, bindings: &Bindings, ctx: &mut Context<'_>) -> Result<()>;
}
