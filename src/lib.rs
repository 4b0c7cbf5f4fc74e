//! # Reactty
//!
//! A pty automation engine that watches a shell's output line by line and
//! reacts to lines that look like a sample.
//!
//! Rules are written as a sample output line, optional markers picking out
//! the variable columns of that line, and one action. When the shell prints a
//! matching line, the action either types a fixed reply into the shell or
//! reports the captured values to a controller process, whose own output is
//! typed back into the shell verbatim.
//!
//! ## Quick start
//!
//! ```no_run
//! use reactty::{Engine, EngineOptions, parse_str};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rules = parse_str(
//!         r#"
//! >Would you like to play a game? (y/n)
//! !terminal "no"
//! "#,
//!     )?;
//!
//!     let engine = Engine::spawn(rules, EngineOptions::new("bash"))?;
//!     let exit_code = engine.run().await?;
//!     std::process::exit(exit_code);
//! }
//! ```
//!
//! ## Rule syntax
//!
//! Leading whitespace is ignored; the first character picks the directive.
//!
//! | Line | Description |
//! |------|-------------|
//! | `>sample line` | Start a rule. The text after `>` is the template, column 0 first |
//! | `?   ... name` | Mark the dotted columns variable and bind them to `name` |
//! | `?   ...` | Mark the dotted columns variable without binding them |
//! | `?   ... name /[0-9]+/` | Same, and require the region to match the regex in full. The regex must accept the template's own text there |
//! | `!terminal "text"` | Type `text` and one end-of-line keystroke into the shell |
//! | `!controller "msg $name"` | Send `msg` with `$name` expanded to the controller |
//! | `# comment` | Ignored, as are blank lines |
//!
//! Action payloads run from the first to the last double quote. Inside them
//! `\n`, `\t`, `\"` and `\\` are escapes, so a literal backslash followed by
//! `n` must be written `\\n`. Any other backslash is kept as written.
//!
//! Marker columns line up with the template: the dots sit under the
//! characters they replace. A line matches when it is at least as wide as
//! the template and every non-variable column is identical. Rules are tried
//! in file order and only the first match fires.
//!
//! ## Custom output handling
//!
//! [`Engine::spawn`] echoes the shell's output to stdout. Use
//! [`Engine::spawn_with_handler`] to send it anywhere else:
//!
//! ```no_run
//! use reactty::{Engine, EngineOptions, parse_str};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rules = parse_str(">Continue?\n!terminal \"y\"\n")?;
//!     let options = EngineOptions::new("sh").with_shell_args(["-c", "echo Continue?; read x"]);
//!
//!     let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::<u8>::new()));
//!     let sink = captured.clone();
//!     let engine = Engine::spawn_with_handler(rules, options, move |data| {
//!         sink.lock().unwrap().extend_from_slice(data);
//!     })?;
//!
//!     engine.run().await?;
//!     println!("{}", String::from_utf8_lossy(&captured.lock().unwrap()));
//!     Ok(())
//! }
//! ```
//!
//! ## Implementing a custom action
//!
//! Implement [`Action`] and register it in the parser's `REGISTRY`:
//!
//! ```no_run
//! use reactty::action::{Action, Context};
//! use reactty::template::Bindings;
//! use async_trait::async_trait;
//! use anyhow::Result;
//!
//! pub struct Interrupt;
//!
//! impl Interrupt {
//!     pub const NAME: &'static str = "interrupt";
//! }
//!
//! #[async_trait(?Send)]
//! impl Action for Interrupt {
//!     fn name(&self) -> &'static str { Self::NAME }
//!
//!     fn parse(_args: &str) -> Result<Self> {
//!         Ok(Self)
//!     }
//!
//!     async fn execute(&self, _bindings: &Bindings, ctx: &mut Context<'_>) -> Result<()> {
//!         ctx.write_to_pty(b"\x03")
//!     }
//! }
//! ```

pub mod action;
pub mod actions;
pub mod assembler;
pub mod controller;
pub mod engine;
pub mod error;
pub mod message;
pub mod parser;
pub(crate) mod pty;
pub mod reader;
pub mod rule;
pub mod template;
pub mod terminal;
pub mod writer;

pub use action::{Action, Context};
pub use actions::{SendToController, TypeLiteral};
pub use engine::{Engine, EngineOptions};
pub use error::{ConfigError, Diagnostic};
pub use parser::{parse_file, parse_named, parse_str};
pub use rule::{Rule, RuleSet};
pub use template::{Bindings, Template, VariableRegion};
