//! [`TypeLiteral`] action: types a fixed line into the shell.
//!
//! Config syntax: `!terminal "text here"`

use crate::action::{Action, Context};
use crate::parser::parse_quoted_string;
use crate::template::Bindings;
use anyhow::Result;
use async_trait::async_trait;

/// Keystroke that ends a typed line.
pub const END_OF_LINE: u8 = b'\n';

/// Types `text` followed by one end-of-line keystroke, as a single write.
///
/// The text is sent literally; `$` has no special meaning here.
#[derive(Debug)]
pub struct TypeLiteral {
    pub data: Vec<u8>,
}

impl TypeLiteral {
    pub const NAME: &'static str = "terminal";

    pub fn new(text: impl Into<String>) -> Self {
        let mut bytes = text.into().into_bytes();
        bytes.push(END_OF_LINE);
        Self { data: bytes }
    }
}

#[async_trait(?Send)]
impl Action for TypeLiteral {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(args: &str) -> Result<Self> {
        Ok(Self::new(parse_quoted_string(args)?))
    }

    async fn execute(&self, _bindings: &Bindings, ctx: &mut Context<'_>) -> Result<()> {
        ctx.write_to_pty(&self.data)
    }
}
