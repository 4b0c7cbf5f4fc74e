mod send_to_controller;
mod type_literal;

pub use send_to_controller::SendToController;
pub use type_literal::TypeLiteral;
