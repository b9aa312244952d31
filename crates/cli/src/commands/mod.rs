pub mod decision;
pub mod forecast;
pub mod status;
pub mod stream;
