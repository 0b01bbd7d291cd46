pub mod activity;
pub mod cart;
pub mod mpesa_transactions;
pub mod order;
pub mod product;
pub mod shop;
pub mod user;
