use anyhow::{Context, Result};
use chrono::Utc;

use turbolink_client::account::{self, AccountService};
use turbolink_client::analytics::{self, AnalyticsService};
use turbolink_client::auth::{AuthSession, LoginOutcome};
use turbolink_client::config::{self, Command, Config};
use turbolink_client::http_client::ApiClient;
use turbolink_client::links::LinkService;
use turbolink_client::models::{Link, LinkUpdate, NameCount};
use turbolink_client::redirect::{RedirectDecision, RedirectGate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "TurboLink client {} using backend {}",
        env!("CARGO_PKG_VERSION"),
        config.backend_url
    );

    let client = ApiClient::from_config(&config)?;
    let session = AuthSession::new(client.clone());

    if command.requires_login() {
        sign_in(&session, &config).await?;
    }

    let result = run(&command, &config, &session).await;

    if session.is_authenticated().await {
        session.logout().await;
    }

    result
}

/// Log in, walking through device verification when the backend asks for it
async fn sign_in(session: &AuthSession, config: &Config) -> Result<()> {
    let (email, password) = config::prompt_credentials(config)?;

    match session.login(&email, &password).await.context("Login failed")? {
        LoginOutcome::Authenticated => {}
        LoginOutcome::DeviceVerificationRequired => {
            let code = config::prompt_device_code()?;
            let verified = session
                .verify_device(&email, &code)
                .await
                .context("Device verification failed")?;
            if !verified {
                anyhow::bail!("Device verified, but no session could be established. Log in again.");
            }
        }
    }

    if !session.is_authenticated().await {
        anyhow::bail!("Logged in, but the profile could not be loaded");
    }

    Ok(())
}

async fn run(command: &Command, config: &Config, session: &AuthSession) -> Result<()> {
    let client = session.client().clone();
    let links = LinkService::new(client.clone());

    match command {
        Command::Shorten { url } => {
            let alias = links.shorten(url).await?;
            println!("{}", config.short_link(&alias));
        }

        Command::Links => {
            let mine = links.list_mine().await?;
            if mine.is_empty() {
                println!("No links yet.");
            }
            for link in &mine {
                print_link_row(link, config);
            }
        }

        Command::Show { alias } => {
            let link = links.get(alias).await?;
            print_link(&link, config);
        }

        Command::Update {
            alias,
            url,
            new_alias,
            password,
            remove_password,
            max_clicks,
            expires_at,
        } => {
            let current = links.get(alias).await?;
            let update = LinkUpdate {
                redirect_url: url.clone().unwrap_or_else(|| current.destination().to_string()),
                short_url: new_alias.clone().unwrap_or_else(|| current.short_url.clone()),
                password: password.clone(),
                max_clicks: max_clicks.or(current.max_clicks),
                expires_at: expires_at.or(current.expires_at),
                password_field_shown: !remove_password,
            };
            let updated = links.update(alias, &update).await?;
            print_link(&updated, config);
        }

        Command::Delete { alias } => {
            links.delete(alias).await?;
            println!("Deleted {}", alias);
        }

        Command::Enable { alias } => {
            links.set_disabled(alias, true).await?;
            println!("Enabled {}", alias);
        }

        Command::Disable { alias } => {
            links.set_disabled(alias, false).await?;
            println!("Disabled {}", alias);
        }

        Command::Analytics { alias } => {
            let data = AnalyticsService::new(client).fetch(alias).await?;
            let summary = analytics::summarize(&data);

            println!("{}: {} clicks", config.short_link(alias), data.clicks);
            print_counts("Browsers", &summary.browsers);
            print_counts("Operating systems", &summary.os);
            print_counts("Countries", &summary.countries);
            print_counts("Referrers", &summary.referrers);
        }

        Command::Resolve {
            alias,
            password,
            referrer,
        } => {
            let gate = RedirectGate::new(client);
            let mut decision = gate.resolve(alias).await;

            if decision == RedirectDecision::PasswordRequired {
                let password = match password {
                    Some(p) => p.clone(),
                    None => config::prompt_password("Link password")?,
                };
                decision = gate
                    .submit_password(alias, &password)
                    .await
                    .context("Password verification failed")?;
            }

            match decision {
                RedirectDecision::Redirect { url, short_url } => {
                    gate.record_click(short_url.as_deref().unwrap_or(alias), referrer.as_deref())
                        .await;
                    println!("{}", url);
                }
                RedirectDecision::Disabled => println!("This link has been disabled by its owner."),
                RedirectDecision::PasswordRequired => anyhow::bail!("Link is still locked"),
                RedirectDecision::Failed { message } => anyhow::bail!(message),
            }
        }

        Command::Profile => {
            let user = session.user().await.context("No user in session")?;
            println!("{}", user.display_name());
            if let Some(email) = &user.email {
                let verified = if user.is_email_verified { "verified" } else { "unverified" };
                println!("  Email:    {} ({})", email, verified);
            }
            let name = [user.first_name.as_deref(), user.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if !name.is_empty() {
                println!("  Name:     {}", name);
            }
            if let Some(created) = user.created_at {
                println!("  Joined:   {}", created.format("%Y-%m-%d"));
            }
        }

        Command::Avatar { source } => {
            let user = session.user().await.context("No user in session")?;
            let service = AccountService::new(client);

            let url = if source.starts_with("http") {
                source.clone()
            } else {
                let bytes = tokio::fs::read(source)
                    .await
                    .with_context(|| format!("Failed to read {}", source))?;
                let file_name = std::path::Path::new(source)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("avatar");
                service
                    .upload_avatar(file_name, account::avatar_mime(file_name), bytes)
                    .await?
            };

            service.set_avatar_url(&user.id, &url).await?;
            println!("Avatar updated: {}", url);
        }

        Command::Signup { username } => {
            let (email, password) = config::prompt_credentials(config)?;
            let response = AccountService::new(client)
                .signup(&email, username, &password)
                .await?;

            if let Some(message) = &response.message {
                println!("{}", message);
            }
            let signed_in = match response.access_token {
                Some(token) => session.establish(token).await,
                None => false,
            };
            if signed_in {
                println!("Account created. Check your inbox to verify your email.");
            } else {
                println!("Account created. Log in once your email is verified.");
            }
        }

        Command::ForgotPassword { email } => {
            let message = AccountService::new(client).forgot_password(email).await?;
            println!(
                "{}",
                message.unwrap_or_else(|| "If the account exists, a reset link was sent.".to_string())
            );
        }

        Command::ResetPassword { token } => {
            let (password, confirmation) = config::prompt_new_password()?;
            let message = AccountService::new(client)
                .reset_password(token, &password, &confirmation)
                .await?;
            println!("{}", message.unwrap_or_else(|| "Password updated.".to_string()));
        }

        Command::VerifyEmail { token } => {
            let message = AccountService::new(client)
                .verify_email(token.as_deref())
                .await?;
            println!("{}", message.unwrap_or_else(|| "Email verified.".to_string()));
        }
    }

    Ok(())
}

fn print_link_row(link: &Link, config: &Config) {
    let status = if link.is_active_at(Utc::now()) { "active" } else { "inactive" };
    let lock = if link.password_protected { " 🔒" } else { "" };
    println!(
        "{:<40} {:>6} clicks  {:<8}{}  → {}",
        config.short_link(&link.short_url),
        link.clicks,
        status,
        lock,
        link.destination()
    );
}

fn print_link(link: &Link, config: &Config) {
    println!("{}", config.short_link(&link.short_url));
    println!("  Destination: {}", link.destination());
    println!(
        "  Status:      {}",
        if link.is_active_at(Utc::now()) { "active" } else { "inactive" }
    );
    match (link.max_clicks, link.usage_percent()) {
        (Some(max), Some(pct)) => println!("  Clicks:      {} / {} ({}%)", link.clicks, max, pct),
        _ => println!("  Clicks:      {}", link.clicks),
    }
    if let Some(expiry) = link.expires_at {
        println!("  Expires:     {}", expiry.to_rfc3339());
    }
    if link.password_protected {
        println!("  Password:    required");
    }
}

fn print_counts(title: &str, counts: &[NameCount]) {
    if counts.is_empty() {
        return;
    }
    println!();
    println!("{}:", title);
    for entry in counts {
        println!("  {:<24} {}", entry.name, entry.count);
    }
}
