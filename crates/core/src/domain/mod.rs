pub mod car;
pub mod contact;
