//! GraphQL documents for the contract's event entities

pub const MARKET_CREATEDS: &str = r#"
query MarketCreateds($first: Int, $skip: Int, $where: MarketCreated_filter) {
  marketCreateds(
    first: $first
    skip: $skip
    orderBy: blockTimestamp
    orderDirection: desc
    where: $where
  ) {
    id
    marketId
    startTime
    deadline
    blockTimestamp
    blockNumber
    transactionHash
  }
}
"#;

pub const MARKET_SETTLEDS: &str = r#"
query MarketSettleds($first: Int, $skip: Int, $where: MarketSettled_filter) {
  marketSettleds(
    first: $first
    skip: $skip
    orderBy: blockTimestamp
    orderDirection: desc
    where: $where
  ) {
    id
    marketId
    finalPrice
    predictionPrice
    totalAmount
    winner
    blockTimestamp
    blockNumber
    transactionHash
  }
}
"#;

pub const MARKET_PARTICIPATIONS: &str = r#"
query MarketParticipations($first: Int, $skip: Int, $where: MarketParticipation_filter) {
  marketParticipations(
    first: $first
    skip: $skip
    orderBy: blockTimestamp
    orderDirection: desc
    where: $where
  ) {
    id
    marketId
    player
    predictionPrice
    blockTimestamp
    blockNumber
    transactionHash
  }
}
"#;

pub const WITHDRAW_BALANCES: &str = r#"
query WithdrawBalances($first: Int, $skip: Int, $where: WithdrawBalance_filter) {
  withdrawBalances(
    first: $first
    skip: $skip
    orderBy: blockTimestamp
    orderDirection: desc
    where: $where
  ) {
    id
    user
    amount
    blockTimestamp
    blockNumber
    transactionHash
  }
}
"#;

pub const OWNERSHIP_TRANSFERREDS: &str = r#"
query OwnershipTransferreds($first: Int, $skip: Int, $where: OwnershipTransferred_filter) {
  ownershipTransferreds(
    first: $first
    skip: $skip
    orderBy: blockTimestamp
    orderDirection: desc
    where: $where
  ) {
    id
    previousOwner
    newOwner
    blockTimestamp
    blockNumber
    transactionHash
  }
}
"#;
