pub mod collision;
pub mod interval;
pub mod macros;
pub mod night;
pub mod target;
pub mod timing;

pub use collision::*;
pub use interval::*;
pub use night::*;
pub use target::*;
pub use timing::*;
