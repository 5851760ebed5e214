use crate::entities::cart::CartLine;
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use uuid::Uuid;

/// In-memory cart aggregate.
///
/// Holds at most one line per `(product_id, variant_sku)`. Adding a pair that
/// already exists increments its quantity and keeps the original
/// `price_at_add`. Quantities are always at least 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    pub fn line(&self, index: usize) -> Result<&CartLine, ServiceError> {
        self.lines
            .get(index)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", index)))
    }

    /// Quantity already held for a product variant, 0 when absent.
    pub fn quantity_of(&self, product_id: Uuid, sku: &str) -> i32 {
        self.position(product_id, sku)
            .map(|idx| self.lines[idx].quantity)
            .unwrap_or(0)
    }

    /// Adds a line, merging into an existing one for the same variant.
    /// Returns the index of the affected line.
    pub fn add(&mut self, line: CartLine) -> Result<usize, ServiceError> {
        validate_quantity(line.quantity)?;

        match self.position(line.product_id, &line.variant_sku) {
            Some(idx) => {
                let existing = &mut self.lines[idx];
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| ServiceError::ValidationError("Quantity too large".into()))?;
                Ok(idx)
            }
            None => {
                self.lines.push(line);
                Ok(self.lines.len() - 1)
            }
        }
    }

    pub fn update_quantity(&mut self, index: usize, quantity: i32) -> Result<(), ServiceError> {
        validate_quantity(quantity)?;
        let line = self
            .lines
            .get_mut(index)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", index)))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<CartLine, ServiceError> {
        if index >= self.lines.len() {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                index
            )));
        }
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn item_count(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }

    fn position(&self, product_id: Uuid, sku: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.product_id == product_id && l.variant_sku == sku)
    }
}

fn validate_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}
