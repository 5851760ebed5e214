use crate::entities::address::Model as AddressModel;
use crate::errors::ServiceError;
use uuid::Uuid;

/// All addresses of one user. Decides which address carries the default
/// flag so that a non-empty book always has exactly one default.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: Vec<AddressModel>,
}

/// Outcome of deleting an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub remove: Uuid,
    /// Address that becomes the default once `remove` is gone
    pub promote: Option<Uuid>,
}

impl AddressBook {
    pub fn new(entries: Vec<AddressModel>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: Uuid) -> Result<&AddressModel, ServiceError> {
        self.entries
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", id)))
    }

    pub fn default_address(&self) -> Option<&AddressModel> {
        self.entries.iter().find(|a| a.is_default)
    }

    /// Whether a newly added address becomes the default. The first address
    /// always does.
    pub fn new_address_is_default(&self, requested: bool) -> bool {
        self.entries.is_empty() || requested
    }

    /// Ids whose default flag must be cleared so `keep` is the only default.
    pub fn defaults_to_clear(&self, keep: Uuid) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|a| a.is_default && a.id != keep)
            .map(|a| a.id)
            .collect()
    }

    pub fn plan_delete(&self, id: Uuid) -> Result<DeletePlan, ServiceError> {
        let target = self.get(id)?;
        if self.entries.len() == 1 {
            return Err(ServiceError::InvalidOperation(
                "Cannot delete the last address".to_string(),
            ));
        }

        let promote = if target.is_default {
            self.entries
                .iter()
                .filter(|a| a.id != id)
                .max_by_key(|a| a.created_at)
                .map(|a| a.id)
        } else {
            None
        };

        Ok(DeletePlan { remove: id, promote })
    }

    /// Default first, then newest first.
    pub fn into_sorted(mut self) -> Vec<AddressModel> {
        self.entries.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    fn address(is_default: bool, age_minutes: i64) -> AddressModel {
        let created = Utc::now() - Duration::minutes(age_minutes);
        AddressModel {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            full_name: "Ana Souza".into(),
            street: "Rua A, 1".into(),
            city: "Recife".into(),
            state: "PE".into(),
            zip_code: "50000-000".into(),
            country: "BR".into(),
            phone: "+55 81 90000-0000".into(),
            is_default,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn first_address_is_always_default() {
        let book = AddressBook::default();
        assert!(book.new_address_is_default(false));
        let book = AddressBook::new(vec![address(true, 10)]);
        assert!(!book.new_address_is_default(false));
        assert!(book.new_address_is_default(true));
    }

    #[test]
    fn cannot_delete_last_address() {
        let only = address(true, 1);
        let id = only.id;
        let book = AddressBook::new(vec![only]);
        assert_matches!(book.plan_delete(id), Err(ServiceError::InvalidOperation(_)));
    }

    #[test]
    fn deleting_default_promotes_newest_remaining() {
        let default = address(true, 30);
        let older = address(false, 20);
        let newer = address(false, 5);
        let (default_id, newer_id) = (default.id, newer.id);
        let book = AddressBook::new(vec![default, older, newer]);

        let plan = book.plan_delete(default_id).unwrap();
        assert_eq!(plan.promote, Some(newer_id));
    }

    #[test]
    fn deleting_non_default_promotes_nothing() {
        let default = address(true, 30);
        let other = address(false, 5);
        let other_id = other.id;
        let book = AddressBook::new(vec![default, other]);
        assert_eq!(book.plan_delete(other_id).unwrap().promote, None);
    }

    #[test]
    fn sorted_puts_default_first_then_newest() {
        let old = address(false, 50);
        let default = address(true, 40);
        let new = address(false, 1);
        let ids = (default.id, new.id, old.id);
        let sorted = AddressBook::new(vec![old, default, new]).into_sorted();
        let got: Vec<Uuid> = sorted.iter().map(|a| a.id).collect();
        assert_eq!(got, vec![ids.0, ids.1, ids.2]);
    }

    #[test]
    fn defaults_to_clear_skips_kept_address() {
        let a = address(true, 3);
        let b = address(false, 2);
        let (a_id, b_id) = (a.id, b.id);
        let book = AddressBook::new(vec![a, b]);
        assert_eq!(book.defaults_to_clear(b_id), vec![a_id]);
        assert!(book.defaults_to_clear(a_id).is_empty());
    }
}
