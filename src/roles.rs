// 🔐 Role Permissions - Server-Side Implication Rules
// The admin role form is a fixed checkbox set; the client applies "manage
// implies view" and "admin implies all" cosmetically, so the same rules are
// re-validated here before a role is trusted.

use serde::{Deserialize, Serialize};

/// The functional areas a role can be granted access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Complaints,
    Issues,
    Repairs,
    Replacements,
    Bookings,
}

impl Area {
    pub const ALL: [Area; 5] = [
        Area::Complaints,
        Area::Issues,
        Area::Repairs,
        Area::Replacements,
        Area::Bookings,
    ];
}

/// One grantable permission: view or manage an area, manage users, or the
/// admin superset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    View(Area),
    Manage(Area),
    ManageUsers,
    Admin,
}

/// The raw checkbox state of one role, exactly as submitted by the admin
/// form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolePermissions {
    #[serde(default)]
    pub can_view_complaints: bool,
    #[serde(default)]
    pub can_manage_complaints: bool,
    #[serde(default)]
    pub can_view_issues: bool,
    #[serde(default)]
    pub can_manage_issues: bool,
    #[serde(default)]
    pub can_view_repairs: bool,
    #[serde(default)]
    pub can_manage_repairs: bool,
    #[serde(default)]
    pub can_view_replacements: bool,
    #[serde(default)]
    pub can_manage_replacements: bool,
    #[serde(default)]
    pub can_view_bookings: bool,
    #[serde(default)]
    pub can_manage_bookings: bool,
    #[serde(default)]
    pub can_manage_users: bool,
    #[serde(default)]
    pub is_admin: bool,
}

impl RolePermissions {
    /// An admin role with every box ticked.
    pub fn admin() -> Self {
        RolePermissions {
            is_admin: true,
            ..Default::default()
        }
        .normalized()
    }

    fn view_flag(&self, area: Area) -> bool {
        match area {
            Area::Complaints => self.can_view_complaints,
            Area::Issues => self.can_view_issues,
            Area::Repairs => self.can_view_repairs,
            Area::Replacements => self.can_view_replacements,
            Area::Bookings => self.can_view_bookings,
        }
    }

    fn manage_flag(&self, area: Area) -> bool {
        match area {
            Area::Complaints => self.can_manage_complaints,
            Area::Issues => self.can_manage_issues,
            Area::Repairs => self.can_manage_repairs,
            Area::Replacements => self.can_manage_replacements,
            Area::Bookings => self.can_manage_bookings,
        }
    }

    fn set_view(&mut self, area: Area, value: bool) {
        match area {
            Area::Complaints => self.can_view_complaints = value,
            Area::Issues => self.can_view_issues = value,
            Area::Repairs => self.can_view_repairs = value,
            Area::Replacements => self.can_view_replacements = value,
            Area::Bookings => self.can_view_bookings = value,
        }
    }

    fn set_manage(&mut self, area: Area, value: bool) {
        match area {
            Area::Complaints => self.can_manage_complaints = value,
            Area::Issues => self.can_manage_issues = value,
            Area::Repairs => self.can_manage_repairs = value,
            Area::Replacements => self.can_manage_replacements = value,
            Area::Bookings => self.can_manage_bookings = value,
        }
    }

    /// Apply the implication rules: `manage` implies `view` per area, and
    /// `admin` implies every permission including `manage_users`.
    pub fn normalized(&self) -> RolePermissions {
        let mut role = self.clone();

        if role.is_admin {
            for area in Area::ALL {
                role.set_manage(area, true);
            }
            role.can_manage_users = true;
        }

        for area in Area::ALL {
            if role.manage_flag(area) {
                role.set_view(area, true);
            }
        }

        role
    }

    /// Whether a (normalized) role grants the permission.
    pub fn allows(&self, permission: Permission) -> bool {
        let role = self.normalized();
        match permission {
            Permission::View(area) => role.view_flag(area),
            Permission::Manage(area) => role.manage_flag(area),
            Permission::ManageUsers => role.can_manage_users,
            Permission::Admin => role.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manage_implies_view() {
        let role = RolePermissions {
            can_manage_issues: true,
            ..Default::default()
        };

        assert!(role.allows(Permission::View(Area::Issues)));
        assert!(role.allows(Permission::Manage(Area::Issues)));
        assert!(!role.allows(Permission::View(Area::Bookings)));
        println!("✅ Manage-implies-view test PASSED");
    }

    #[test]
    fn test_view_does_not_imply_manage() {
        let role = RolePermissions {
            can_view_repairs: true,
            ..Default::default()
        };

        assert!(role.allows(Permission::View(Area::Repairs)));
        assert!(!role.allows(Permission::Manage(Area::Repairs)));
    }

    #[test]
    fn test_admin_implies_everything() {
        let role = RolePermissions {
            is_admin: true,
            ..Default::default()
        };

        for area in Area::ALL {
            assert!(role.allows(Permission::View(area)));
            assert!(role.allows(Permission::Manage(area)));
        }
        assert!(role.allows(Permission::ManageUsers));
        assert!(role.allows(Permission::Admin));
        println!("✅ Admin-implies-all test PASSED");
    }

    #[test]
    fn test_normalized_sets_the_implied_flags() {
        let role = RolePermissions {
            can_manage_complaints: true,
            ..Default::default()
        }
        .normalized();

        assert!(role.can_view_complaints);
        assert!(!role.can_view_issues);

        let admin = RolePermissions::admin();
        assert!(admin.can_view_bookings);
        assert!(admin.can_manage_bookings);
        assert!(admin.can_manage_users);
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let role = RolePermissions {
            can_manage_replacements: true,
            is_admin: false,
            ..Default::default()
        };

        let once = role.normalized();
        let twice = once.normalized();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_role_allows_nothing() {
        let role = RolePermissions::default();
        for area in Area::ALL {
            assert!(!role.allows(Permission::View(area)));
            assert!(!role.allows(Permission::Manage(area)));
        }
        assert!(!role.allows(Permission::ManageUsers));
    }

    #[test]
    fn test_roundtrip_through_json() {
        let role = RolePermissions {
            can_manage_issues: true,
            can_view_bookings: true,
            ..Default::default()
        };

        let json = serde_json::to_string(&role).unwrap();
        let back: RolePermissions = serde_json::from_str(&json).unwrap();
        assert_eq!(role, back);
    }
}
