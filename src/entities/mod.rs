//! Storage entities for the storefront.
//!
//! Cart lines, order items and the shipping snapshot are stored as JSON
//! documents on their parent row so they are always read and written together.

pub mod address;
pub mod cart;
pub mod order;
pub mod order_sequence;
pub mod product;
pub mod product_variant;
pub mod user;

pub use address::{Entity as Address, Model as AddressModel};
pub use cart::{CartLine, CartLines, Entity as Cart, Model as CartModel};
pub use order::{
    Entity as Order, Model as OrderModel, OrderItem, OrderItems, OrderStatus, PaymentMethod,
    PaymentStatus, ShippingAddressSnapshot,
};
pub use order_sequence::{Entity as OrderSequence, Model as OrderSequenceModel};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus, StringList};
pub use product_variant::{Color, Entity as ProductVariant, Model as ProductVariantModel, Size};
pub use user::{Entity as User, Model as UserModel, Role, UserStatus};
