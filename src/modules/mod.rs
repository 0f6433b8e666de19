pub mod enhancement;
pub mod poller;
