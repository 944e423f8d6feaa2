//! Stack configuration.
//!
//! Every environment variable the stack recognizes is read here, once, into a
//! [`StackConfig`]. Composition only ever sees the struct.

use secrecy::SecretString;

/// Environment variable names.
pub mod vars {
    /// Target account.
    pub const CDK_DEFAULT_ACCOUNT: &str = "CDK_DEFAULT_ACCOUNT";
    /// Target region.
    pub const CDK_DEFAULT_REGION: &str = "CDK_DEFAULT_REGION";
    /// `prod` / `production` selects production mode.
    pub const ENV: &str = "ENV";
    /// Reuse an existing VPC instead of creating one.
    pub const VPC_ID: &str = "VPC_ID";
    /// Literal UI password instead of a generated one.
    pub const UI_PASSWORD_OVERRIDE: &str = "UI_PASSWORD_OVERRIDE";
    /// Literal master key instead of a generated one.
    pub const MASTER_KEY_OVERRIDE: &str = "MASTER_KEY_OVERRIDE";
    /// Fallback for [`MASTER_KEY_OVERRIDE`].
    pub const LITELLM_MASTER_KEY: &str = "LITELLM_MASTER_KEY";
    /// UI admin username.
    pub const UI_USERNAME: &str = "UI_USERNAME";
    /// Azure OpenAI key.
    pub const AZURE_API_KEY: &str = "AZURE_API_KEY";
    /// Fallback for [`AZURE_API_KEY`].
    pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
    /// OpenAI key.
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    /// Anthropic key.
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
    /// Groq key.
    pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
}

/// Default stack name.
pub const DEFAULT_STACK_NAME: &str = "LiteLLMStack";

/// Default proxy image, pinned to a release tag.
pub const DEFAULT_IMAGE: &str = "ghcr.io/berriai/litellm:main-v1.63.2-stable";

/// Default UI admin username.
pub const DEFAULT_UI_USERNAME: &str = "admin";

/// Value stored for provider keys the operator did not supply.
pub const PLACEHOLDER_API_KEY: &str = "placeholder";

/// Upstream provider API keys. Names must match the `os.environ/...`
/// references in the proxy config document.
#[derive(Debug, Default)]
pub struct ProviderApiKeys {
    pub azure: Option<SecretString>,
    pub openai: Option<SecretString>,
    pub anthropic: Option<SecretString>,
    pub groq: Option<SecretString>,
}

impl ProviderApiKeys {
    /// Key names as they appear in the combined secret and in the container.
    pub const NAMES: [&'static str; 4] = [
        vars::AZURE_API_KEY,
        vars::OPENAI_API_KEY,
        vars::ANTHROPIC_API_KEY,
        vars::GROQ_API_KEY,
    ];

    /// `(name, value)` pairs in [`Self::NAMES`] order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, Option<&SecretString>); 4] {
        [
            (vars::AZURE_API_KEY, self.azure.as_ref()),
            (vars::OPENAI_API_KEY, self.openai.as_ref()),
            (vars::ANTHROPIC_API_KEY, self.anthropic.as_ref()),
            (vars::GROQ_API_KEY, self.groq.as_ref()),
        ]
    }
}

/// Everything that parameterizes the stack.
#[derive(Debug)]
pub struct StackConfig {
    /// Stack name.
    pub stack_name: String,
    /// Target account (`CDK_DEFAULT_ACCOUNT`).
    pub account: Option<String>,
    /// Target region (`CDK_DEFAULT_REGION`).
    pub region: Option<String>,
    /// Production mode: retain data on delete, version the bucket, protect the database.
    pub production: bool,
    /// Existing VPC to reuse (`VPC_ID`).
    pub vpc_id: Option<String>,
    /// Explicit availability zones for a fresh VPC; derived from the region when empty.
    pub availability_zones: Vec<String>,
    /// NAT gateways for a fresh VPC.
    pub nat_gateways: usize,
    /// UI admin username.
    pub ui_username: String,
    /// Literal UI password.
    pub ui_password_override: Option<SecretString>,
    /// Literal master key.
    pub master_key_override: Option<SecretString>,
    /// Upstream provider keys.
    pub api_keys: ProviderApiKeys,
    /// Proxy container image.
    pub image: String,
    /// Roll back deployments that fail health checks.
    pub circuit_breaker: bool,
    /// Number of proxy tasks.
    pub desired_count: u32,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            account: None,
            region: None,
            production: false,
            vpc_id: None,
            availability_zones: Vec::new(),
            nat_gateways: 1,
            ui_username: DEFAULT_UI_USERNAME.to_string(),
            ui_password_override: None,
            master_key_override: None,
            api_keys: ProviderApiKeys::default(),
            image: DEFAULT_IMAGE.to_string(),
            circuit_breaker: true,
            desired_count: 1,
        }
    }
}

impl StackConfig {
    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source. Empty values are
    /// treated as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let secret = |name: &str| get(name).map(SecretString::new);

        Self {
            account: get(vars::CDK_DEFAULT_ACCOUNT),
            region: get(vars::CDK_DEFAULT_REGION),
            production: get(vars::ENV).is_some_and(|v| is_production(&v)),
            vpc_id: get(vars::VPC_ID),
            ui_username: get(vars::UI_USERNAME).unwrap_or_else(|| DEFAULT_UI_USERNAME.to_string()),
            ui_password_override: secret(vars::UI_PASSWORD_OVERRIDE),
            master_key_override: secret(vars::MASTER_KEY_OVERRIDE)
                .or_else(|| secret(vars::LITELLM_MASTER_KEY)),
            api_keys: ProviderApiKeys {
                azure: secret(vars::AZURE_API_KEY).or_else(|| secret(vars::AZURE_OPENAI_API_KEY)),
                openai: secret(vars::OPENAI_API_KEY),
                anthropic: secret(vars::ANTHROPIC_API_KEY),
                groq: secret(vars::GROQ_API_KEY),
            },
            ..Self::default()
        }
    }

    /// Set the stack name.
    #[must_use]
    pub fn with_stack_name(mut self, name: impl Into<String>) -> Self {
        self.stack_name = name.into();
        self
    }

    /// Set production mode.
    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Reuse an existing VPC.
    #[must_use]
    pub fn with_vpc_id(mut self, vpc_id: impl Into<String>) -> Self {
        self.vpc_id = Some(vpc_id.into());
        self
    }

    /// Set the target region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set explicit availability zones.
    #[must_use]
    pub fn with_availability_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.availability_zones = zones.into_iter().map(Into::into).collect();
        self
    }

    /// Use a literal UI password.
    #[must_use]
    pub fn with_ui_password_override(mut self, password: impl Into<String>) -> Self {
        self.ui_password_override = Some(SecretString::new(password.into()));
        self
    }

    /// Use a literal master key.
    #[must_use]
    pub fn with_master_key_override(mut self, key: impl Into<String>) -> Self {
        self.master_key_override = Some(SecretString::new(key.into()));
        self
    }

    /// Set the proxy image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Enable or disable the deployment circuit breaker.
    #[must_use]
    pub fn with_circuit_breaker(mut self, enabled: bool) -> Self {
        self.circuit_breaker = enabled;
        self
    }

    /// `production` or `development`, for logs and the manifest.
    #[must_use]
    pub fn mode_label(&self) -> &'static str {
        if self.production {
            "production"
        } else {
            "development"
        }
    }
}

fn is_production(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "prod" | "production")
}
