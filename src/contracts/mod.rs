// Contracts Module - Public ABIs Only

pub mod erc20;
pub mod token_exchange;

// Public exports
pub use erc20::Erc20;
pub use token_exchange::ITokenExchange;
