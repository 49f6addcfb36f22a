//! Static permission matrices. Data, not logic: the grant tables live here
//! and nothing in this file consults the store or the request.

use crate::lifecycle::EntityKind;
use crate::scope::Scope;

use super::{Action, Bucket, Role};

const RWD: &[Bucket] = &[Bucket::Read, Bucket::Write, Bucket::Delete];
const RW: &[Bucket] = &[Bucket::Read, Bucket::Write];
const R: &[Bucket] = &[Bucket::Read];
const NONE: &[Bucket] = &[];

/// Role x scope -> granted buckets. CrossOrg rows other than SuperAdmin's are
/// empty; the scope resolver already restricts CrossOrg to platform actors.
pub(super) fn scope_grants(role: Role, scope: Scope) -> &'static [Bucket] {
    match (role, scope) {
        (Role::SuperAdmin, _) => RWD,

        (Role::Admin, Scope::Own | Scope::OwnDept) => RWD,
        (Role::Admin, Scope::CrossDept) => R,
        (Role::Admin, Scope::CrossOrg) => NONE,

        (Role::Manager, Scope::Own) => RWD,
        (Role::Manager, Scope::OwnDept) => RW,
        (Role::Manager, Scope::CrossDept) => R,
        (Role::Manager, Scope::CrossOrg) => NONE,

        (Role::User, Scope::Own) => RW,
        (Role::User, Scope::OwnDept) => R,
        (Role::User, Scope::CrossDept | Scope::CrossOrg) => NONE,
    }
}

/// Role x resource kind x action. Organization create/delete/restore is
/// additionally platform-gated in the handlers; this table only widens for
/// SuperAdmin so the gate stays the deciding predicate.
pub(super) fn kind_grants(role: Role, kind: EntityKind, action: Action) -> bool {
    use Action::*;

    match role {
        Role::SuperAdmin => true,

        Role::Admin => match kind {
            EntityKind::Organization => matches!(action, Read | Update),
            _ => true,
        },

        Role::Manager => match kind {
            EntityKind::Organization | EntityKind::Department => matches!(action, Read),
            EntityKind::User => matches!(action, Create | Read | Update),
            EntityKind::Task | EntityKind::TaskComment | EntityKind::Material => {
                matches!(action, Create | Read | Update | Delete)
            }
            EntityKind::TaskActivity => matches!(action, Read),
            EntityKind::Vendor => matches!(action, Read | Update),
            EntityKind::Attachment => matches!(action, Create | Read | Delete),
            EntityKind::Notification => matches!(action, Read | Update | Delete),
        },

        Role::User => match kind {
            EntityKind::Organization | EntityKind::Department => matches!(action, Read),
            EntityKind::User => matches!(action, Read | Update),
            EntityKind::Task | EntityKind::TaskComment => matches!(action, Create | Read | Update),
            EntityKind::TaskActivity => matches!(action, Read),
            EntityKind::Material | EntityKind::Vendor => matches!(action, Read),
            EntityKind::Attachment => matches!(action, Create | Read),
            EntityKind::Notification => matches!(action, Read | Update),
        },
    }
}
