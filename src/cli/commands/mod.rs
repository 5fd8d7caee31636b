pub mod address;
pub mod context;
pub mod history;
pub mod rediscover;
pub mod test_rpc;
pub mod transaction;
