pub mod balance;
pub mod composer;
pub mod config;
pub mod exchange;
pub mod notify;
pub mod order_list;
pub mod resolver;
pub mod rpc_pool;
pub mod serum;
pub mod session;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testkit;

pub use balance::*;
pub use composer::*;
pub use config::*;
pub use exchange::*;
pub use notify::*;
pub use order_list::*;
pub use resolver::*;
pub use rpc_pool::*;
pub use session::*;
pub use wallet::*;
