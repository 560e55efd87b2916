// config.rs
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
    // Payment gateway
    pub gateway_api_base: String,
    pub gateway_secret_key: String,
    pub gateway_webhook_secret: String,
    pub gateway_timeout: Duration,
    pub webhook_tolerance: Duration,
    // Escrow policy
    pub platform_fee_percentage: u32,
    pub currency: String,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let gateway_secret_key =
            std::env::var("GATEWAY_SECRET_KEY").expect("GATEWAY_SECRET_KEY must be set");
        let gateway_webhook_secret =
            std::env::var("GATEWAY_WEBHOOK_SECRET").expect("GATEWAY_WEBHOOK_SECRET must be set");

        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| app_url.clone())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        let gateway_api_base = std::env::var("GATEWAY_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());
        let gateway_timeout = Duration::from_secs(env_number("GATEWAY_TIMEOUT_SECS", 10));
        let webhook_tolerance = Duration::from_secs(env_number("WEBHOOK_TOLERANCE_SECS", 300));

        let platform_fee_percentage = env_number("PLATFORM_FEE_PERCENTAGE", 20) as u32;
        if platform_fee_percentage > 100 {
            panic!("PLATFORM_FEE_PERCENTAGE must be between 0 and 100");
        }
        let currency = std::env::var("PAYMENT_CURRENCY")
            .unwrap_or_else(|_| "usd".to_string())
            .to_lowercase();

        Config {
            database_url,
            app_url,
            jwt_secret,
            port,
            allowed_origins,
            log_level,
            gateway_api_base,
            gateway_secret_key,
            gateway_webhook_secret,
            gateway_timeout,
            webhook_tolerance,
            platform_fee_percentage,
            currency,
        }
    }
}

fn env_number(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Config {
        Config {
            database_url: "postgres://localhost/tasknest_test".to_string(),
            app_url: "http://localhost:5173".to_string(),
            jwt_secret: "test_jwt_secret".to_string(),
            port: 8000,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            log_level: "debug".to_string(),
            gateway_api_base: "http://localhost:12111/v1".to_string(),
            gateway_secret_key: "sk_test_123".to_string(),
            gateway_webhook_secret: "whsec_test".to_string(),
            gateway_timeout: Duration::from_millis(200),
            webhook_tolerance: Duration::from_secs(300),
            platform_fee_percentage: 20,
            currency: "usd".to_string(),
        }
    }
}
