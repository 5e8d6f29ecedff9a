//! Tenant model
//!
//! A tenant is one customer organization. [`TenantContext`] is the small
//! derived value attached to a request once the tenant has been resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status. Only `Active` tenants serve traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Inactive,
    Pending,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Plan tier. Only consulted when default settings are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantPlan {
    #[default]
    Basic,
    Pro,
    Enterprise,
}

impl std::fmt::Display for TenantPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFeatures {
    pub projects: bool,
    pub ecommerce: bool,
    pub webhooks: bool,
}

/// Numeric quotas; `-1` is unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantLimits {
    pub users: i64,
    pub projects: i64,
    pub products: i64,
}

impl TenantLimits {
    pub const UNLIMITED: i64 = -1;

    pub fn is_unlimited(value: i64) -> bool {
        value == Self::UNLIMITED
    }
}

/// Feature flags and quotas assigned at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub features: TenantFeatures,
    pub limits: TenantLimits,
}

impl TenantSettings {
    /// Defaults for a plan
    ///
    /// ```
    /// use orgspace_tenancy::{TenantPlan, TenantSettings};
    ///
    /// let settings = TenantSettings::for_plan(TenantPlan::Pro);
    /// assert!(settings.features.ecommerce);
    /// assert_eq!(settings.limits.users, 50);
    /// ```
    pub fn for_plan(plan: TenantPlan) -> Self {
        match plan {
            TenantPlan::Basic => Self {
                features: TenantFeatures {
                    projects: true,
                    ecommerce: false,
                    webhooks: false,
                },
                limits: TenantLimits {
                    users: 5,
                    projects: 3,
                    products: 100,
                },
            },
            TenantPlan::Pro => Self {
                features: TenantFeatures {
                    projects: true,
                    ecommerce: true,
                    webhooks: false,
                },
                limits: TenantLimits {
                    users: 50,
                    projects: 25,
                    products: 1000,
                },
            },
            TenantPlan::Enterprise => Self {
                features: TenantFeatures {
                    projects: true,
                    ecommerce: true,
                    webhooks: true,
                },
                limits: TenantLimits {
                    users: TenantLimits::UNLIMITED,
                    projects: TenantLimits::UNLIMITED,
                    products: TenantLimits::UNLIMITED,
                },
            },
        }
    }
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self::for_plan(TenantPlan::default())
    }
}

/// Tenant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Opaque identifier, immutable
    pub id: String,
    /// Display name
    pub name: String,
    /// Unique, `[a-z0-9-]+`
    pub slug: String,
    /// Unique when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub status: TenantStatus,
    pub plan: TenantPlan,
    pub settings: TenantSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn context(&self) -> TenantContext {
        TenantContext::new(&self.id, &self.slug)
    }
}

/// Request-scoped tenant identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: String,
    pub tenant_slug: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, tenant_slug: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenant_slug: tenant_slug.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tenant {
        let now = Utc::now();
        Tenant {
            id: "t-1".to_string(),
            name: "Acme Inc.".to_string(),
            slug: "acme".to_string(),
            domain: None,
            status: TenantStatus::Active,
            plan: TenantPlan::Basic,
            settings: TenantSettings::for_plan(TenantPlan::Basic),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_plan_defaults() {
        let basic = TenantSettings::for_plan(TenantPlan::Basic);
        assert!(basic.features.projects);
        assert!(!basic.features.ecommerce);
        assert!(!basic.features.webhooks);
        assert_eq!((basic.limits.users, basic.limits.projects, basic.limits.products), (5, 3, 100));

        let pro = TenantSettings::for_plan(TenantPlan::Pro);
        assert!(pro.features.ecommerce);
        assert!(!pro.features.webhooks);
        assert_eq!((pro.limits.users, pro.limits.projects, pro.limits.products), (50, 25, 1000));

        let enterprise = TenantSettings::for_plan(TenantPlan::Enterprise);
        assert!(enterprise.features.webhooks);
        assert!(TenantLimits::is_unlimited(enterprise.limits.users));
        assert!(TenantLimits::is_unlimited(enterprise.limits.products));
    }

    #[test]
    fn test_context() {
        let tenant = sample();
        assert!(tenant.is_active());
        assert_eq!(tenant.context(), TenantContext::new("t-1", "acme"));
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["slug"], "acme");
        assert_eq!(json["status"], "active");
        assert_eq!(json["plan"], "basic");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("domain").is_none());
    }

    #[test]
    fn test_status_parse() {
        let status: TenantStatus = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(status, TenantStatus::Inactive);
        assert_eq!(TenantStatus::Pending.to_string(), "pending");
        assert_eq!(TenantPlan::Enterprise.to_string(), "enterprise");
    }
}
