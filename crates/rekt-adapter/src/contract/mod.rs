//! REKT contract access over Ethereum JSON-RPC
//!
//! - `abi`: Solidity ABI codec (selectors, head/tail encoding, return decoding)
//! - `rpc`: JSON-RPC 2.0 transport
//! - `RektContract`: typed reads and writes against the deployed contract

pub mod abi;
mod rekt;
pub mod rpc;

pub use rekt::{CreateMarketParams, RektContract, TxReceipt};
pub use rpc::JsonRpcClient;

/// Canonical function signatures
pub mod signatures {
    pub const MARKETS: &str = "markets(uint256)";
    pub const GET_MARKET_PHASE: &str = "getMarketPhase(uint256)";
    pub const GET_PLAYERS: &str = "getPlayers(uint256)";
    pub const GET_PLAYER_DATA: &str = "getPlayerData(uint256,address)";
    pub const CREATE_MARKET: &str = "createMarket(uint256,uint256,uint256,uint256,string)";
    pub const PARTICIPATE_IN_MARKET: &str = "participateInMarket(uint256,uint256,bytes32)";
    pub const SETTLE_MARKET: &str = "settleMarket(uint256,uint256)";
}
