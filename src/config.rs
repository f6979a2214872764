use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Base URL of this API (webhook notification URLs are built from it)
    pub base_url: String,
    /// Where buyers land after checkout (the storefront)
    pub redirect_url: String,
    pub pricing: PricingConfig,
    pub wompi: WompiConfig,
    pub mercado_pago: MercadoPagoConfig,
    pub sweep: SweepSettings,
    pub dev_mode: bool,
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Price of a single wallpaper, in currency cents
    pub wallpaper_price_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct WompiConfig {
    pub api_url: String,
    pub checkout_url: String,
    pub public_key: String,
    pub private_key: String,
    /// Secret for the checkout integrity signature
    pub integrity_secret: String,
    /// Secret for inbound event checksums
    pub events_secret: String,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub api_url: String,
    pub access_token: String,
    /// Secret for the inbound x-signature header
    pub webhook_secret: String,
}

/// Reconciliation sweep schedule and timeout policy.
///
/// The three timeouts escalate: a purchase that never got a provider
/// transaction id is abandoned quickly; one whose id was never confirmed by
/// the provider waits longer; one with a confirmed id is only given up on
/// after the hard timeout, and only when the provider cannot be reached.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub interval: Duration,
    pub abandonment_window_secs: i64,
    pub reference_timeout_secs: i64,
    pub hard_timeout_secs: i64,
    /// Delay between consecutive provider status queries within one sweep
    pub pacing: Duration,
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("FONDO_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let redirect_url = env::var("REDIRECT_URL").unwrap_or_else(|_| base_url.clone());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "fondo.db".to_string()),
            base_url,
            redirect_url,
            pricing: PricingConfig {
                // 25,000 COP expressed in cents
                wallpaper_price_cents: env_i64("WALLPAPER_PRICE_CENTS", 2_500_000),
                currency: env::var("CURRENCY").unwrap_or_else(|_| "COP".to_string()),
            },
            wompi: WompiConfig {
                api_url: env::var("WOMPI_API_URL")
                    .unwrap_or_else(|_| "https://production.wompi.co/v1".to_string()),
                checkout_url: env::var("WOMPI_CHECKOUT_URL")
                    .unwrap_or_else(|_| "https://checkout.wompi.co/p/".to_string()),
                public_key: env::var("WOMPI_PUBLIC_KEY").unwrap_or_default(),
                private_key: env::var("WOMPI_PRIVATE_KEY").unwrap_or_default(),
                integrity_secret: env::var("WOMPI_INTEGRITY_SECRET").unwrap_or_default(),
                events_secret: env::var("WOMPI_EVENTS_SECRET").unwrap_or_default(),
            },
            mercado_pago: MercadoPagoConfig {
                api_url: env::var("MP_API_URL")
                    .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
                access_token: env::var("MP_ACCESS_TOKEN").unwrap_or_default(),
                webhook_secret: env::var("MP_WEBHOOK_SECRET").unwrap_or_default(),
            },
            sweep: SweepSettings {
                interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 5 * 60)),
                abandonment_window_secs: env_i64("SWEEP_ABANDONMENT_MINUTES", 30) * 60,
                reference_timeout_secs: env_i64("SWEEP_REFERENCE_TIMEOUT_HOURS", 6) * 3600,
                hard_timeout_secs: env_i64("SWEEP_HARD_TIMEOUT_HOURS", 24) * 3600,
                pacing: Duration::from_millis(env_u64("SWEEP_PACING_MS", 250)),
            },
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
