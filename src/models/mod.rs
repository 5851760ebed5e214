// Domain aggregates. Services mutate carts and address books only through these.
pub mod address_book;
pub mod cart;

pub use address_book::{AddressBook, DeletePlan};
pub use cart::Cart;
