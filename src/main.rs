use clap::{Parser, Subcommand};
use loan_desk::application::LoanApplication;
use loan_desk::config::Config;
use loan_desk::desk::{LoanDesk, LoanQuery};
use loan_desk::error::WorkflowError;
use loan_desk::identity::{CredentialVerifier, Principal, Role};
use loan_desk::repayment::PaymentRequest;
use loan_desk::store::{SledStore, Store};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loan-desk", version, about = "Loan origination and servicing desk")]
struct Cli {
    /// Staff token, with or without the `Bearer ` prefix
    #[arg(long, global = true, env = "LOAN_DESK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a staff token for a known user
    Token {
        #[arg(long)]
        id: String,
        #[arg(long)]
        username: String,
        /// admin, maker, checker or accountant
        #[arg(long)]
        role: String,
    },
    /// Submit a loan application read from a JSON file
    Submit { file: PathBuf },
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Show { loan_id: String },
    /// Approve or reject a pending loan
    Review {
        loan_id: String,
        /// approve or reject
        action: String,
        #[arg(long)]
        comments: Option<String>,
    },
    Disburse { loan_id: String, reference: String },
    /// Loan counts by status and the total amount
    Stats,
    /// Record a repayment against a disbursed loan
    Pay {
        loan_id: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Repayments {
        #[arg(long)]
        loan: Option<String>,
    },
    RepaymentStats,
}

fn to_json<T: Serialize>(value: T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

async fn run<S: Store, V: CredentialVerifier>(
    desk: &LoanDesk<S, V>,
    token: Option<&str>,
    command: Command,
) -> anyhow::Result<Value> {
    match command {
        Command::Token { .. } => anyhow::bail!("tokens are issued without opening the store"),
        Command::Submit { file } => {
            let application: LoanApplication =
                serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let loan_id = desk.submit(&application).await?;
            Ok(json!({ "loanId": loan_id }))
        }
        Command::List {
            status,
            search,
            limit,
        } => {
            let query = LoanQuery {
                status,
                search,
                limit,
            };
            to_json(desk.list(token, &query).await?)
        }
        Command::Show { loan_id } => to_json(desk.get(token, &loan_id).await?),
        Command::Review {
            loan_id,
            action,
            comments,
        } => to_json(
            desk.review(token, &loan_id, &action, comments.as_deref())
                .await?,
        ),
        Command::Disburse { loan_id, reference } => {
            to_json(desk.disburse(token, &loan_id, &reference).await?)
        }
        Command::Stats => to_json(desk.loan_stats(token).await?),
        Command::Pay {
            loan_id,
            date,
            amount,
            method,
            reference,
            notes,
        } => {
            let mut request = PaymentRequest::new(&loan_id, &date, &amount);
            request.payment_method = method;
            request.reference_number = reference;
            request.notes = notes;

            let repayment_id = desk.record_payment(token, &request).await?;
            Ok(json!({ "repaymentId": repayment_id }))
        }
        Command::Repayments { loan: Some(loan_id) } => {
            to_json(desk.list_repayments_for_loan(token, &loan_id).await?)
        }
        Command::Repayments { loan: None } => to_json(desk.list_repayments(token).await?),
        Command::RepaymentStats => to_json(desk.repayment_stats(token).await?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Command::Token { id, username, role } = &cli.command {
        let principal = Principal::new(id, username, role.parse::<Role>()?);
        println!("{}", config.token_authority().issue(&principal)?);
        return Ok(());
    }

    let store = Arc::new(SledStore::open(&config.db_path)?);
    tracing::debug!(db = %config.db_path.display(), "Store opened");

    let desk = LoanDesk::new(
        store.clone(),
        config.token_authority(),
        config.intake.clone(),
        config.store_timeout,
    );
    let result = run(&desk, cli.token.as_deref(), cli.command).await;
    store.flush().await?;

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => match err.downcast_ref::<WorkflowError>() {
            Some(workflow) => {
                let body = json!({
                    "code": workflow.code(),
                    "error": workflow.public_message(),
                    "retryable": workflow.is_retryable(),
                });
                eprintln!("{body}");
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}
