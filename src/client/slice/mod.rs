mod macros;
pub mod ro;
pub mod wo;

pub use ro::RegisterView;
pub use wo::RegisterViewMut;
