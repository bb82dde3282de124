//! Role-based authorization matrix (admin > sales > buyer)
//!
//! Every check is a pure function of the acting user's role and id plus whatever
//! ownership facts the caller already loaded, so handlers and services can call
//! them after fetching a row and before touching it.

use uuid::Uuid;

use crate::types::Role;

/// The authenticated user performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Users

pub fn can_manage_users(actor: &Actor) -> bool {
    actor.is_admin()
}

pub fn can_view_user(actor: &Actor, target: Uuid) -> bool {
    actor.is_admin() || actor.id == target
}

// Products

pub fn can_manage_products(actor: &Actor) -> bool {
    actor.is_admin()
}

pub fn can_view_products(actor: &Actor) -> bool {
    actor.role.is_staff()
}

// Demos, media and assignments

pub fn can_manage_demos(actor: &Actor) -> bool {
    actor.is_admin()
}

/// Staff see every demo; buyers only see active demos assigned to them
pub fn can_view_demo(actor: &Actor, demo_active: bool, assigned: bool) -> bool {
    match actor.role {
        Role::Admin | Role::Sales => true,
        Role::Buyer => demo_active && assigned,
    }
}

pub fn can_view_credentials(actor: &Actor, assigned: bool) -> bool {
    match actor.role {
        Role::Admin | Role::Sales => true,
        Role::Buyer => assigned,
    }
}

// Share links

pub fn can_create_share_link(actor: &Actor) -> bool {
    actor.role.is_staff()
}

pub fn can_revoke_share_link(actor: &Actor, created_by: Uuid) -> bool {
    actor.is_admin() || (actor.role == Role::Sales && actor.id == created_by)
}

/// Whether listings should be narrowed to links the actor created
pub fn share_links_scoped_to_creator(actor: &Actor) -> bool {
    !actor.is_admin()
}

// Leads and feedback

pub fn can_create_leads(actor: &Actor) -> bool {
    actor.role.is_staff()
}

/// Admins reach every lead; salespeople only the leads they brought in
pub fn can_access_lead(actor: &Actor, shared_by: Option<Uuid>) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Sales => shared_by == Some(actor.id),
        Role::Buyer => false,
    }
}

/// Whether listings should be narrowed to the actor's own leads
pub fn leads_scoped_to_owner(actor: &Actor) -> bool {
    !actor.is_admin()
}

pub fn can_record_feedback(actor: &Actor, lead_shared_by: Option<Uuid>) -> bool {
    can_access_lead(actor, lead_shared_by)
}

pub fn can_view_feedback(actor: &Actor) -> bool {
    actor.role.is_staff()
}

pub fn can_delete_feedback(actor: &Actor) -> bool {
    actor.is_admin()
}

// Storage

pub fn can_view_storage(actor: &Actor, owner: Uuid) -> bool {
    actor.is_admin() || actor.id == owner
}

pub fn can_set_storage_limit(actor: &Actor) -> bool {
    actor.is_admin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    #[test]
    fn only_admins_manage_catalog_and_users() {
        let admin = actor(Role::Admin);
        for other in [actor(Role::Sales), actor(Role::Buyer)] {
            assert!(!can_manage_users(&other));
            assert!(!can_manage_products(&other));
            assert!(!can_manage_demos(&other));
            assert!(!can_set_storage_limit(&other));
            assert!(!can_delete_feedback(&other));
        }
        assert!(can_manage_users(&admin));
        assert!(can_manage_products(&admin));
        assert!(can_manage_demos(&admin));
    }

    #[test]
    fn buyers_see_only_active_assigned_demos() {
        let buyer = actor(Role::Buyer);
        assert!(can_view_demo(&buyer, true, true));
        assert!(!can_view_demo(&buyer, false, true));
        assert!(!can_view_demo(&buyer, true, false));

        let sales = actor(Role::Sales);
        assert!(can_view_demo(&sales, false, false));
        assert!(!can_view_products(&buyer));
        assert!(can_view_products(&sales));
    }

    #[test]
    fn credentials_follow_assignment_for_buyers() {
        assert!(can_view_credentials(&actor(Role::Buyer), true));
        assert!(!can_view_credentials(&actor(Role::Buyer), false));
        assert!(can_view_credentials(&actor(Role::Sales), false));
    }

    #[test]
    fn salespeople_own_their_leads() {
        let sales = actor(Role::Sales);
        let colleague = Uuid::new_v4();

        assert!(can_access_lead(&sales, Some(sales.id)));
        assert!(!can_access_lead(&sales, Some(colleague)));
        assert!(!can_access_lead(&sales, None));
        assert!(can_access_lead(&actor(Role::Admin), None));
        assert!(!can_access_lead(&actor(Role::Buyer), None));

        assert!(leads_scoped_to_owner(&sales));
        assert!(!leads_scoped_to_owner(&actor(Role::Admin)));
        assert!(can_record_feedback(&sales, Some(sales.id)));
        assert!(!can_record_feedback(&sales, Some(colleague)));
    }

    #[test]
    fn share_link_revocation() {
        let sales = actor(Role::Sales);
        assert!(can_revoke_share_link(&sales, sales.id));
        assert!(!can_revoke_share_link(&sales, Uuid::new_v4()));
        assert!(can_revoke_share_link(&actor(Role::Admin), Uuid::new_v4()));

        let buyer = actor(Role::Buyer);
        assert!(!can_create_share_link(&buyer));
        assert!(!can_revoke_share_link(&buyer, buyer.id));
    }

    #[test]
    fn storage_visibility() {
        let buyer = actor(Role::Buyer);
        assert!(can_view_storage(&buyer, buyer.id));
        assert!(!can_view_storage(&buyer, Uuid::new_v4()));
        assert!(can_view_storage(&actor(Role::Admin), buyer.id));
    }

    #[test]
    fn users_can_view_themselves() {
        let sales = actor(Role::Sales);
        assert!(can_view_user(&sales, sales.id));
        assert!(!can_view_user(&sales, Uuid::new_v4()));
    }
}
