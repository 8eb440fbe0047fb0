pub mod http;
pub mod secrets;
pub mod table;
