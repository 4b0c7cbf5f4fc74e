//! [`SendToController`] action: reports a match to the controller process.
//!
//! Config syntax: `!controller "REPLY $seq $ttl $time"`

use crate::action::{Action, Context};
use crate::message::MessageFormat;
use crate::parser::parse_quoted_string;
use crate::template::Bindings;
use anyhow::Result;
use async_trait::async_trait;

/// Expands `$name` placeholders with the match bindings and sends the result
/// to the controller as one newline-terminated line.
#[derive(Debug)]
pub struct SendToController {
    pub format: MessageFormat,
}

impl SendToController {
    pub const NAME: &'static str = "controller";

    pub fn new(format: &str) -> Self {
        Self {
            format: MessageFormat::parse(format),
        }
    }
}

#[async_trait(?Send)]
impl Action for SendToController {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(args: &str) -> Result<Self> {
        Ok(Self::new(&parse_quoted_string(args)?))
    }

    fn references(&self) -> Vec<&str> {
        self.format.references()
    }

    async fn execute(&self, bindings: &Bindings, ctx: &mut Context<'_>) -> Result<()> {
        ctx.send_to_controller(&self.format.expand(bindings)).await
    }
}
