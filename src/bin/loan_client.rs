//! Terminal client for the underwriting API
//!
//! Submits applications and repayments, and renders explanations and
//! borrower progress as text bar charts.

use clap::{Parser, Subcommand};
use eyre::{eyre, WrapErr};
use reqwest::{Client, Response, Url};
use serde_json::{json, Value};

const BAR_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "loan_client")]
#[command(about = "Apply for micro-loans and track repayment progress", long_about = None)]
struct Cli {
    /// API base URL
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    base_url: String,

    /// Sent as X-API-Key when the server requires one
    #[arg(long)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a loan application
    Apply {
        #[arg(long, default_value = "user123")]
        user_id: String,
        #[arg(long, default_value_t = 1000.0)]
        amount: f64,
        /// Mobile-money transactions per month
        #[arg(long, default_value_t = 15.0)]
        transaction_frequency: f64,
        /// Average transaction amount
        #[arg(long, default_value_t = 100.0)]
        avg_transaction_amount: f64,
        /// Share of utility bills paid on time, 0-1
        #[arg(long, default_value_t = 0.9)]
        utility_payment_consistency: f64,
        /// Airtime top-ups per month
        #[arg(long, default_value_t = 8.0)]
        airtime_topup_frequency: f64,
    },
    /// Show streak, points, badges and repayment history
    Progress { user_id: String },
    /// Record a repayment
    Repay {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        loan_id: String,
        #[arg(long)]
        amount: f64,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.base_url, cli.api_key)?;

    match cli.command {
        Commands::Apply {
            user_id,
            amount,
            transaction_frequency,
            avg_transaction_amount,
            utility_payment_consistency,
            airtime_topup_frequency,
        } => {
            let body = json!({
                "user_id": user_id,
                "loan_amount": amount,
                "transaction_frequency": transaction_frequency,
                "avg_transaction_amount": avg_transaction_amount,
                "utility_payment_consistency": utility_payment_consistency,
                "airtime_topup_frequency": airtime_topup_frequency,
            });
            let result = api.post(&["loan", "apply"], &body).await?;
            print_json(&result);
            print_application(&result);
        }
        Commands::Progress { user_id } => {
            let result = api.get(&["user", "progress", &user_id]).await?;
            print_json(&result);
            print_progress(&result);
        }
        Commands::Repay {
            user_id,
            loan_id,
            amount,
            date,
        } => {
            let payment_date =
                date.unwrap_or_else(|| chrono::Local::now().date_naive().to_string());
            let body = json!({
                "user_id": user_id,
                "loan_id": loan_id,
                "payment_date": payment_date,
                "amount": amount,
            });
            let result = api.post(&["repayment", "record"], &body).await?;
            print_json(&result);
            print_repayment(&result);
        }
    }

    Ok(())
}

struct ApiClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl ApiClient {
    fn new(base_url: &str, api_key: Option<String>) -> eyre::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .wrap_err("Failed to build HTTP client")?;
        let base_url = Url::parse(base_url)
            .wrap_err_with(|| format!("Invalid base URL {}", base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(eyre!("Base URL {} cannot carry a path", base_url));
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Base URL plus percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> eyre::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| eyre!("Base URL {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> eyre::Result<Value> {
        let mut request = self.client.get(self.endpoint(segments)?);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = request.send().await.wrap_err("Request failed")?;
        read_json(response).await
    }

    async fn post(&self, segments: &[&str], body: &Value) -> eyre::Result<Value> {
        let mut request = self.client.post(self.endpoint(segments)?).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        let response = request.send().await.wrap_err("Request failed")?;
        read_json(response).await
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{}\n", pretty),
        Err(_) => println!("{}\n", value),
    }
}

async fn read_json(response: Response) -> eyre::Result<Value> {
    let status = response.status();
    let raw = response.text().await.wrap_err("Failed to read response")?;
    let body: Option<Value> = serde_json::from_str(&raw).ok();
    if !status.is_success() {
        let detail = body
            .as_ref()
            .and_then(|b| b.get("detail"))
            .and_then(Value::as_str)
            .unwrap_or(raw.as_str());
        return Err(eyre!("{} {}", status.as_u16(), detail));
    }
    body.ok_or_else(|| eyre!("Response was not JSON"))
}

/// Horizontal bar scaled against `max`, with sign marker
fn bar(value: f64, max: f64) -> String {
    let filled = if max > 0.0 {
        ((value.abs() / max) * BAR_WIDTH as f64).round() as usize
    } else {
        0
    };
    let glyph = if value < 0.0 { '-' } else { '+' };
    std::iter::repeat(glyph).take(filled.min(BAR_WIDTH)).collect()
}

fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

fn print_application(result: &Value) {
    println!("Loan {}: {}", text(result, "loan_id"), text(result, "decision"));
    let score = result.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    println!("Score {:>6.2} |{:<width$}|", score, bar(score, 100.0), width = BAR_WIDTH);

    if let Some(explanation) = result.get("explanation").and_then(Value::as_object) {
        let max = explanation
            .values()
            .filter_map(Value::as_f64)
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        println!("\nFeature contributions (log-odds):");
        for (name, value) in explanation {
            let v = value.as_f64().unwrap_or(0.0);
            println!("  {:<28} {:>8.3} {}", name, v, bar(v, max));
        }
    }
    print_badges(result);
    println!("\n{}", text(result, "message"));
}

fn print_progress(result: &Value) {
    let gamification = result.get("gamification").cloned().unwrap_or(Value::Null);
    println!("User {}", text(result, "user_id"));
    println!("  Streak: {}", text(&gamification, "repayment_streak"));
    println!("  Points: {}", text(&gamification, "points_earned"));
    print_badges(&gamification);

    if let Some(profile) = result.get("alternative_data").and_then(Value::as_object) {
        println!("\nAlternative data:");
        for (name, value) in profile {
            let v = value.as_f64().unwrap_or(0.0);
            let max = feature_max(name);
            println!("  {:<28} {:>8.2} {}", name, v, bar(v, max));
        }
    }

    let history = gamification
        .get("progress_map")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if history.is_empty() {
        println!("\nNo repayments yet.");
        return;
    }

    let max = history
        .iter()
        .filter_map(|r| r.get("amount").and_then(Value::as_f64))
        .fold(0.0_f64, f64::max);
    println!("\nRepayments:");
    for record in &history {
        let amount = record.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
        let status = text(record, "status");
        let glyph = if status == "on-time" { "#" } else { "x" };
        let filled = bar(amount, max).len();
        println!(
            "  {} {:<8} {:>10.2} {}",
            text(record, "date"),
            status,
            amount,
            glyph.repeat(filled)
        );
    }
}

fn print_repayment(result: &Value) {
    println!(
        "Loan {} repaid {} (streak {})",
        text(result, "loan_id"),
        text(result, "status"),
        text(result, "new_repayment_streak")
    );
    let score = result.get("new_score").and_then(Value::as_f64).unwrap_or(0.0);
    println!("Score {:>6.2} |{:<width$}|", score, bar(score, 100.0), width = BAR_WIDTH);
    print_badges(result);
    println!("\n{}", text(result, "message"));
}

/// Upper end of the range each feature is usually seen in
fn feature_max(name: &str) -> f64 {
    match name {
        "transaction_frequency" => 20.0,
        "avg_transaction_amount" => 200.0,
        "utility_payment_consistency" => 1.0,
        "airtime_topup_frequency" => 10.0,
        _ => 1.0,
    }
}

fn print_badges(value: &Value) {
    let badges: Vec<&str> = value
        .get("badges_earned")
        .and_then(Value::as_array)
        .map(|b| b.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !badges.is_empty() {
        println!("  Badges: {}", badges.join(", "));
    }
}
