//! Authorization policy.
//!
//! Every protected handler calls [`authorize`] before doing any work.

use super::Principal;
use crate::domain::aggregates::Role;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Products and categories.
    ManageCatalog,
    ManageCoupons,
    ManageSuppliers,
    ManageUsers,
    /// Read a single order.
    ReadOrder,
    ViewAllOrders,
    /// Update, change status of, or fulfill orders.
    ManageOrders,
    /// Edit or delete a review.
    ModifyReview,
    ViewDashboard,
    RefundPayments,
    ViewAllTranscripts,
}

impl Capability {
    /// Capabilities the resource owner holds regardless of role.
    fn owner_may(self) -> bool {
        matches!(self, Self::ReadOrder | Self::ModifyReview)
    }

    fn manager_may(self) -> bool {
        matches!(
            self,
            Self::ManageCatalog | Self::ReadOrder | Self::ViewAllOrders | Self::ManageOrders | Self::ViewDashboard
        )
    }
}

/// Allow or refuse `principal` the `capability` on a resource owned by `owner`.
pub fn authorize(principal: &Principal, capability: Capability, owner: Option<&str>) -> Result<(), ApiError> {
    let allowed = match principal.role {
        Role::Admin => true,
        Role::Manager if capability.manager_may() => true,
        _ => capability.owner_may() && owner.is_some_and(|o| o == principal.uid),
    };
    if allowed {
        Ok(())
    } else {
        tracing::debug!(uid = %principal.uid, role = principal.role.as_str(), ?capability, "Access denied");
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(uid: &str, role: Role) -> Principal {
        Principal { uid: uid.to_string(), email: format!("{uid}@example.com"), name: None, role }
    }

    #[test]
    fn test_admin_may_do_everything() {
        let admin = principal("a", Role::Admin);
        assert!(authorize(&admin, Capability::RefundPayments, None).is_ok());
        assert!(authorize(&admin, Capability::ModifyReview, Some("someone-else")).is_ok());
    }

    #[test]
    fn test_manager_scope() {
        let manager = principal("m", Role::Manager);
        assert!(authorize(&manager, Capability::ManageCatalog, None).is_ok());
        assert!(authorize(&manager, Capability::ViewDashboard, None).is_ok());
        assert!(authorize(&manager, Capability::ManageCoupons, None).is_err());
        assert!(authorize(&manager, Capability::ModifyReview, Some("c")).is_err());
        assert!(authorize(&manager, Capability::ModifyReview, Some("m")).is_ok());
    }

    #[test]
    fn test_customer_owns_their_resources() {
        let customer = principal("c", Role::Customer);
        assert!(authorize(&customer, Capability::ReadOrder, Some("c")).is_ok());
        assert!(authorize(&customer, Capability::ReadOrder, Some("d")).is_err());
        assert!(authorize(&customer, Capability::ReadOrder, None).is_err());
        assert!(authorize(&customer, Capability::ManageOrders, Some("c")).is_err());
    }

    #[test]
    fn test_refusal_is_forbidden() {
        let err = authorize(&principal("c", Role::Customer), Capability::ManageUsers, None).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
