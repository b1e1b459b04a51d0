pub mod apps;
pub mod constants;
pub mod devnet;
pub mod factories;

#[allow(unused_imports)]
pub use apps::*;
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use devnet::*;
#[allow(unused_imports)]
pub use factories::*;
