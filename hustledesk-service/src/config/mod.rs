//! Configuration module for hustledesk-service.

use crate::models::Plan;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

const MPESA_SANDBOX_URL: &str = "https://sandbox.safaricom.co.ke";
const MPESA_PRODUCTION_URL: &str = "https://api.safaricom.co.ke";
const STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct HustleDeskConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Public base URL used for callbacks and checkout redirects.
    pub app_url: String,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mpesa: MpesaConfig,
    pub stripe: StripeConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Bearer token verification settings. Exactly one key source is used:
/// the RS256 public key when present, otherwise the HS256 secret.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Option<Secret<String>>,
    pub jwt_public_key: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "live" => MpesaEnvironment::Production,
            _ => MpesaEnvironment::Sandbox,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => MPESA_SANDBOX_URL,
            MpesaEnvironment::Production => MPESA_PRODUCTION_URL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: Option<Secret<String>>,
    pub consumer_secret: Option<Secret<String>>,
    pub shortcode: Option<String>,
    pub passkey: Option<Secret<String>>,
    pub environment: MpesaEnvironment,
    pub base_url: String,
    /// Shared token appended to callback URLs and checked on webhooks.
    pub callback_token: Option<Secret<String>>,
}

/// Monthly price id plus an optional yearly one.
#[derive(Debug, Clone, Default)]
pub struct PlanPrices {
    pub monthly: Option<String>,
    pub yearly: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<Secret<String>>,
    pub webhook_secret: Option<Secret<String>>,
    pub api_base_url: String,
    pub starter: PlanPrices,
    pub growth: PlanPrices,
    pub scale: PlanPrices,
}

impl StripeConfig {
    fn prices(&self, plan: Plan) -> Option<&PlanPrices> {
        match plan {
            Plan::Starter => Some(&self.starter),
            Plan::Growth => Some(&self.growth),
            Plan::Scale => Some(&self.scale),
            Plan::Free => None,
        }
    }

    /// Price id for a plan; yearly falls back to monthly when unset.
    pub fn price_id(&self, plan: Plan, yearly: bool) -> Option<&str> {
        let prices = self.prices(plan)?;
        let monthly = prices.monthly.as_deref();
        if yearly {
            prices.yearly.as_deref().or(monthly)
        } else {
            monthly
        }
    }

    /// Plan owning a configured price id, FREE when unknown.
    pub fn plan_for_price(&self, price_id: &str) -> Plan {
        [Plan::Starter, Plan::Growth, Plan::Scale]
            .into_iter()
            .find(|plan| {
                self.prices(*plan).is_some_and(|p| {
                    p.monthly.as_deref() == Some(price_id) || p.yearly.as_deref() == Some(price_id)
                })
            })
            .unwrap_or(Plan::Free)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub webhook_per_minute: u32,
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_secret(name: &str) -> Option<Secret<String>> {
    env_opt(name).map(Secret::new)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_opt(name).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn plan_prices(plan: &str) -> PlanPrices {
    PlanPrices {
        monthly: env_opt(&format!("STRIPE_{}_PRICE_ID", plan)),
        yearly: env_opt(&format!("STRIPE_{}_YEARLY_PRICE_ID", plan)),
    }
}

impl HustleDeskConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let auth = AuthConfig {
            jwt_secret: env_secret("AUTH_JWT_SECRET"),
            jwt_public_key: env_opt("AUTH_JWT_PUBLIC_KEY"),
            issuer: env_opt("AUTH_JWT_ISSUER"),
            audience: env_opt("AUTH_JWT_AUDIENCE"),
        };
        if auth.jwt_secret.is_none() && auth.jwt_public_key.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "AUTH_JWT_SECRET or AUTH_JWT_PUBLIC_KEY is required"
            )));
        }

        let environment = MpesaEnvironment::parse(&env_opt("MPESA_ENV").unwrap_or_default());

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "hustledesk-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env_opt("OTLP_ENDPOINT"),
            app_url: env_opt("APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            database: DatabaseConfig {
                url: env_secret("DATABASE_URL").ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 2),
            },
            auth,
            mpesa: MpesaConfig {
                consumer_key: env_secret("MPESA_CONSUMER_KEY"),
                consumer_secret: env_secret("MPESA_CONSUMER_SECRET"),
                shortcode: env_opt("MPESA_SHORTCODE"),
                passkey: env_secret("MPESA_PASSKEY"),
                environment,
                base_url: env_opt("MPESA_BASE_URL")
                    .unwrap_or_else(|| environment.base_url().to_string()),
                callback_token: env_secret("MPESA_CALLBACK_TOKEN"),
            },
            stripe: StripeConfig {
                secret_key: env_secret("STRIPE_SECRET_KEY"),
                webhook_secret: env_secret("STRIPE_WEBHOOK_SECRET"),
                api_base_url: env_opt("STRIPE_API_BASE_URL")
                    .unwrap_or_else(|| STRIPE_API_URL.to_string()),
                starter: plan_prices("STARTER"),
                growth: plan_prices("GROWTH"),
                scale: plan_prices("SCALE"),
            },
            rate_limit: RateLimitConfig {
                webhook_per_minute: env_parse("WEBHOOK_RATE_LIMIT_PER_MINUTE", 120),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripe() -> StripeConfig {
        StripeConfig {
            secret_key: None,
            webhook_secret: None,
            api_base_url: STRIPE_API_URL.to_string(),
            starter: PlanPrices {
                monthly: Some("price_starter_m".into()),
                yearly: Some("price_starter_y".into()),
            },
            growth: PlanPrices {
                monthly: Some("price_growth_m".into()),
                yearly: None,
            },
            scale: PlanPrices::default(),
        }
    }

    #[test]
    fn yearly_price_falls_back_to_monthly() {
        let cfg = stripe();
        assert_eq!(cfg.price_id(Plan::Starter, true), Some("price_starter_y"));
        assert_eq!(cfg.price_id(Plan::Growth, true), Some("price_growth_m"));
        assert_eq!(cfg.price_id(Plan::Scale, false), None);
        assert_eq!(cfg.price_id(Plan::Free, false), None);
    }

    #[test]
    fn price_ids_map_back_to_plans() {
        let cfg = stripe();
        assert_eq!(cfg.plan_for_price("price_starter_y"), Plan::Starter);
        assert_eq!(cfg.plan_for_price("price_growth_m"), Plan::Growth);
        assert_eq!(cfg.plan_for_price("price_unknown"), Plan::Free);
    }

    #[test]
    fn mpesa_environment_defaults_to_sandbox() {
        assert_eq!(MpesaEnvironment::parse(""), MpesaEnvironment::Sandbox);
        assert_eq!(
            MpesaEnvironment::parse("Production").base_url(),
            MPESA_PRODUCTION_URL
        );
    }
}
