use anyhow::{bail, Result};

use crate::models::User;

/// Who is acting, and whose data they are looking at.
///
/// Every store query and report takes one of these instead of reading a
/// global "current user". A master may point `subject` at another user;
/// everyone else always works on their own records.
#[derive(Debug, Clone)]
pub struct ViewContext {
    actor: User,
    subject: User,
}

impl ViewContext {
    pub fn own(actor: User) -> Self {
        ViewContext {
            subject: actor.clone(),
            actor,
        }
    }

    pub fn viewing(actor: User, subject: User) -> Result<Self> {
        if actor.id != subject.id && !actor.is_master() {
            bail!(
                "User '{}' is not a master and cannot view data of '{}'",
                actor.email,
                subject.email
            );
        }
        Ok(ViewContext { actor, subject })
    }

    pub fn actor(&self) -> &User {
        &self.actor
    }

    pub fn subject(&self) -> &User {
        &self.subject
    }

    /// Owner id substituted into every scoped query.
    pub fn subject_id(&self) -> i64 {
        self.subject.id
    }

    pub fn is_supervising(&self) -> bool {
        self.actor.id != self.subject.id
    }

    pub fn require_master(&self) -> Result<()> {
        if !self.actor.is_master() {
            bail!("This command requires the master role");
        }
        Ok(())
    }

    /// Header line shown above dashboards.
    pub fn banner(&self) -> String {
        if self.is_supervising() {
            format!("Viewing map of: {}", self.subject.name)
        } else {
            format!(
                "{} | Sector: {} | Position: {}",
                self.actor.name, self.actor.sector, self.actor.position
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
            role,
            sector: "Ops".to_string(),
            position: "Analyst".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_own_context() {
        let ctx = ViewContext::own(user(1, Role::Normal));
        assert_eq!(ctx.subject_id(), 1);
        assert!(!ctx.is_supervising());
        assert!(ctx.banner().contains("Sector: Ops"));
    }

    #[test]
    fn test_master_can_view_others() {
        let ctx = ViewContext::viewing(user(1, Role::Master), user(2, Role::Normal)).unwrap();
        assert_eq!(ctx.subject_id(), 2);
        assert!(ctx.is_supervising());
        assert_eq!(ctx.banner(), "Viewing map of: User 2");
    }

    #[test]
    fn test_normal_cannot_view_others() {
        let result = ViewContext::viewing(user(1, Role::Normal), user(2, Role::Normal));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a master"));
    }

    #[test]
    fn test_normal_can_view_self() {
        assert!(ViewContext::viewing(user(1, Role::Normal), user(1, Role::Normal)).is_ok());
    }

    #[test]
    fn test_require_master() {
        assert!(ViewContext::own(user(1, Role::Normal)).require_master().is_err());
        assert!(ViewContext::own(user(1, Role::Master)).require_master().is_ok());
    }
}
