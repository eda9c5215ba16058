use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::application::{DEFAULT_TOP_SPENDERS, LedgerService, TransactionFilter};
use crate::domain::{
    AccountId, AccountType, NewAccount, NewTransaction, TransactionType, format_pence,
    parse_pence,
};

/// Creditunion - community bank ledger
#[derive(Parser)]
#[command(name = "creditunion")]
#[command(about = "Accounts, payments and round-up savings on an append-only ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "CREDITUNION_DB", default_value = "creditunion.db")]
    pub database: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Business management commands
    #[command(subcommand)]
    Business(BusinessCommands),

    /// Post a transaction
    Post {
        /// Transaction type: payment, withdrawal, deposit, transfer
        transaction_type: String,

        /// Amount (e.g., "12.50" or "12")
        amount: String,

        /// Paying account (name or id)
        #[arg(long)]
        from: Option<String>,

        /// Receiving account (name or id)
        #[arg(long)]
        to: Option<String>,

        /// Date of the transaction (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Free-text description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List transactions
    Transactions {
        /// Filter by account (name or id)
        #[arg(long)]
        account: Option<String>,

        /// Filter by transaction type
        #[arg(short = 't', long = "type")]
        transaction_type: Option<String>,

        /// Filter from date (YYYY-MM-DD)
        #[arg(long)]
        from_date: Option<String>,

        /// Filter to date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to_date: Option<String>,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show detailed transaction information
    Show {
        /// Transaction ID
        id: String,
    },

    /// Show balance for an account or all accounts
    Balance {
        /// Account name or id (omit for all accounts)
        account: Option<String>,
    },

    /// Spending reports
    #[command(subcommand)]
    Report(ReportCommands),

    /// Export data to CSV or JSON
    Export {
        /// What to export
        #[arg(value_enum)]
        export_type: ExportType,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Verify ledger integrity
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Account name (must be unique)
        name: String,

        /// Account type: current, savings, business
        #[arg(short = 't', long = "type", default_value = "current")]
        account_type: String,

        /// Opening balance (e.g., "100.00")
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        balance: String,

        /// Enable round-up savings
        #[arg(long)]
        round_up: bool,

        /// Postcode
        #[arg(long)]
        postcode: Option<String>,

        /// Allow the balance to go negative (defaults by account type)
        #[arg(long)]
        overdraft: Option<bool>,

        /// Business this account belongs to (name or id)
        #[arg(long)]
        business: Option<String>,
    },

    /// List all accounts
    List,

    /// Show detailed account information
    Show {
        /// Account name or id
        account: String,
    },

    /// Rename an account
    Rename {
        /// Account name or id
        account: String,

        /// New name
        new_name: String,
    },

    /// Turn round-up savings on or off (toggles when neither flag is given)
    RoundUp {
        /// Account name or id
        account: String,

        #[arg(long, conflicts_with = "off")]
        on: bool,

        #[arg(long)]
        off: bool,
    },

    /// Move the round-up pot back into the balance
    Reclaim {
        /// Account name or id
        account: String,
    },
}

#[derive(Subcommand)]
pub enum BusinessCommands {
    /// Register a business
    Create {
        /// Business name (must be unique)
        name: String,

        /// Category (e.g., "groceries")
        #[arg(short, long, default_value = "")]
        category: String,
    },

    /// List all businesses
    List,

    /// Show business details and linked accounts
    Show {
        /// Business name or id
        business: String,
    },

    /// Block payments to a business
    Sanction {
        /// Business name or id
        business: String,
    },

    /// Lift a sanction
    Unsanction {
        /// Business name or id
        business: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Where an account's money went, by destination
    Spending {
        /// Account name or id
        account: String,
    },

    /// Accounts ranked by total spend
    TopSpenders {
        /// Number of accounts to show
        #[arg(short, long, default_value_t = DEFAULT_TOP_SPENDERS)]
        limit: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExportType {
    Accounts,
    Transactions,
    Full,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let service = match self.command {
            Commands::Init => LedgerService::init(&self.database).await?,
            _ => LedgerService::connect(&self.database)
                .await
                .with_context(|| {
                    format!(
                        "Failed to open database '{}'. Run 'creditunion init' first",
                        self.database
                    )
                })?,
        };

        let outcome = run_command(&service, &self.database, self.command).await;
        service.close().await;
        outcome
    }
}

async fn run_command(service: &LedgerService, database: &str, command: Commands) -> Result<()> {
    match command {
        Commands::Init => println!("Database initialized: {}", database),

        Commands::Account(cmd) => run_account_command(service, cmd).await?,

        Commands::Business(cmd) => run_business_command(service, cmd).await?,

        Commands::Post {
            transaction_type,
            amount,
            from,
            to,
            date,
            description,
        } => {
            let kind: TransactionType = transaction_type
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let amount = parse_pence(&amount).context("Invalid amount format. Use '12.50' or '12'")?;

            let mut request = NewTransaction::new(kind, amount);
            if let Some(reference) = from {
                request = request.source(resolve_account(service, &reference).await?);
            }
            if let Some(reference) = to {
                request = request.destination(resolve_account(service, &reference).await?);
            }
            if let Some(date_str) = date {
                request = request.at(parse_date(&date_str)?);
            }
            if let Some(description) = description {
                request = request.with_description(description);
            }

            let transaction = service.post_transaction(request).await?;
            println!(
                "Posted {} of {} (#{}, {})",
                transaction.transaction_type(),
                format_pence(transaction.amount()),
                transaction.sequence(),
                transaction.id()
            );
            if transaction.round_up() > 0 {
                println!("  Round-up saved: {}", format_pence(transaction.round_up()));
            }
        }

        Commands::Transactions {
            account,
            transaction_type,
            from_date,
            to_date,
            limit,
        } => {
            let filter = TransactionFilter {
                account,
                transaction_type: transaction_type
                    .map(|t| t.parse::<TransactionType>().map_err(|e| anyhow::anyhow!(e)))
                    .transpose()?,
                from_date: from_date.as_deref().map(parse_date).transpose()?,
                to_date: to_date.as_deref().map(parse_end_of_day).transpose()?,
                limit,
            };
            run_transactions_command(service, filter).await?;
        }

        Commands::Show { id } => {
            let id = Uuid::parse_str(&id).context("Invalid transaction ID")?;
            run_show_transaction_command(service, id).await?;
        }

        Commands::Balance { account } => run_balance_command(service, account).await?,

        Commands::Report(cmd) => run_report_command(service, cmd).await?,

        Commands::Export {
            export_type,
            format,
            output,
        } => run_export_command(service, export_type, format, output.as_deref()).await?,

        Commands::Check => run_check_command(service).await?,
    }
    Ok(())
}

async fn resolve_account(service: &LedgerService, reference: &str) -> Result<AccountId> {
    Ok(service.get_account(reference).await?.id)
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            name,
            account_type,
            balance,
            round_up,
            postcode,
            overdraft,
            business,
        } => {
            let account_type: AccountType = account_type.parse().map_err(|e| {
                anyhow::anyhow!(
                    "Invalid account type '{}'. Valid types: current, savings, business. Error: {}",
                    account_type,
                    e
                )
            })?;
            let starting_balance =
                parse_pence(&balance).context("Invalid balance format. Use '100.00' or '100'")?;

            let mut request = NewAccount::new(name, account_type, starting_balance).round_up(round_up);
            if let Some(postcode) = postcode {
                request = request.postcode(postcode);
            }
            if let Some(allow) = overdraft {
                request = request.allow_overdraft(allow);
            }
            if let Some(business) = business {
                request = request.business(business);
            }

            let account = service.create_account(request).await?;
            println!(
                "Created account: {} ({}, {})",
                account.name, account.account_type, account.id
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!(
                    "{:<20} {:<10} {:<9} {:<10}",
                    "NAME", "TYPE", "ROUND-UP", "OVERDRAFT"
                );
                println!("{}", "-".repeat(52));
                for account in accounts {
                    println!(
                        "{:<20} {:<10} {:<9} {:<10}",
                        truncate(&account.name, 20),
                        account.account_type,
                        yes_no(account.round_up_enabled),
                        yes_no(account.allow_overdraft)
                    );
                }
            }
        }

        AccountCommands::Show { account } => {
            let entry = service.current_balance(&account).await?;
            let account = &entry.account;
            let history = service.account_transactions(&account.id.to_string()).await?;
            let reclaims = service.list_reclaims(&account.id.to_string()).await?;

            println!("Account: {}", account.name);
            println!("  ID:              {}", account.id);
            println!("  Type:            {}", account.account_type);
            println!("  Overdraft:       {}", yes_no(account.allow_overdraft));
            if let Some(postcode) = &account.postcode {
                println!("  Postcode:        {}", postcode);
            }
            if let Some(business_id) = account.business_id {
                let business = service.get_business(&business_id.to_string()).await?;
                println!("  Business:        {}", business.name);
            }
            println!(
                "  Created:         {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Opening balance: {}", format_pence(account.starting_balance));
            println!("  Balance:         {}", format_pence(entry.current_balance));
            println!(
                "  Round-up:        {} (pot {})",
                if account.round_up_enabled { "on" } else { "off" },
                format_pence(entry.round_up_pot)
            );
            if !reclaims.is_empty() {
                let total: i64 = reclaims.iter().map(|r| r.amount).sum();
                println!(
                    "  Reclaimed:       {} over {} reclaim(s)",
                    format_pence(total),
                    reclaims.len()
                );
            }
            println!("  Transactions:    {}", history.len());
            if let Some(last) = history.last() {
                println!(
                    "  Last activity:   {}",
                    last.timestamp().format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        AccountCommands::Rename { account, new_name } => {
            let renamed = service.rename_account(&account, &new_name).await?;
            println!("Renamed account: {} -> {}", account, renamed.name);
        }

        AccountCommands::RoundUp { account, on, off } => {
            let updated = if on {
                service.set_round_up(&account, true).await?
            } else if off {
                service.set_round_up(&account, false).await?
            } else {
                service.toggle_round_up(&account).await?
            };
            println!(
                "Round-up for {} is now {}",
                updated.name,
                if updated.round_up_enabled { "on" } else { "off" }
            );
        }

        AccountCommands::Reclaim { account } => {
            let amount = service.reclaim_round_up(&account).await?;
            if amount == 0 {
                println!("Round-up pot for {} is empty.", account);
            } else {
                println!("Reclaimed {} into {}", format_pence(amount), account);
            }
        }
    }
    Ok(())
}

async fn run_business_command(service: &LedgerService, cmd: BusinessCommands) -> Result<()> {
    match cmd {
        BusinessCommands::Create { name, category } => {
            let business = service.create_business(&name, &category).await?;
            println!("Created business: {} ({})", business.name, business.id);
        }

        BusinessCommands::List => {
            let businesses = service.list_businesses().await?;
            if businesses.is_empty() {
                println!("No businesses found.");
            } else {
                println!("{:<24} {:<16} {:<10}", "NAME", "CATEGORY", "SANCTIONED");
                println!("{}", "-".repeat(52));
                for business in businesses {
                    println!(
                        "{:<24} {:<16} {:<10}",
                        truncate(&business.name, 24),
                        truncate(&business.category, 16),
                        yes_no(business.sanctioned)
                    );
                }
            }
        }

        BusinessCommands::Show { business } => {
            let business = service.get_business(&business).await?;
            let accounts: Vec<_> = service
                .list_accounts()
                .await?
                .into_iter()
                .filter(|a| a.business_id == Some(business.id))
                .collect();

            println!("Business: {}", business.name);
            println!("  ID:         {}", business.id);
            if !business.category.is_empty() {
                println!("  Category:   {}", business.category);
            }
            println!("  Sanctioned: {}", yes_no(business.sanctioned));
            println!(
                "  Created:    {}",
                business.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            if !accounts.is_empty() {
                println!("  Accounts:");
                for account in accounts {
                    println!("    - {} ({})", account.name, account.id);
                }
            }
        }

        BusinessCommands::Sanction { business } => {
            let business = service.set_sanctioned(&business, true).await?;
            println!("Sanctioned business: {}", business.name);
        }

        BusinessCommands::Unsanction { business } => {
            let business = service.set_sanctioned(&business, false).await?;
            println!("Lifted sanction on business: {}", business.name);
        }
    }
    Ok(())
}

async fn run_transactions_command(service: &LedgerService, filter: TransactionFilter) -> Result<()> {
    let transactions = service.list_transactions(filter).await?;
    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let names = service.account_names().await?;
    let name_of = |id: Option<AccountId>| match id {
        Some(id) => names.get(&id).cloned().unwrap_or_else(|| id.to_string()),
        None => "-".to_string(),
    };

    println!(
        "{:>5} {:<10} {:<10} {:>10} {:<16} {:<16} {:>8} {}",
        "SEQ", "DATE", "TYPE", "AMOUNT", "FROM", "TO", "ROUND-UP", "DESCRIPTION"
    );
    println!("{}", "-".repeat(100));
    for tx in &transactions {
        println!(
            "{:>5} {:<10} {:<10} {:>10} {:<16} {:<16} {:>8} {}",
            tx.sequence(),
            tx.timestamp().format("%Y-%m-%d"),
            tx.transaction_type(),
            format_pence(tx.amount()),
            truncate(&name_of(tx.from_account()), 16),
            truncate(&name_of(tx.to_account()), 16),
            format_pence(tx.round_up()),
            truncate(tx.description().unwrap_or(""), 30)
        );
    }
    println!("\n{} transaction(s)", transactions.len());
    Ok(())
}

async fn run_show_transaction_command(service: &LedgerService, id: Uuid) -> Result<()> {
    let transaction = service.get_transaction(id).await?;

    println!("Transaction: {}", transaction.id());
    println!("  Sequence:    {}", transaction.sequence());
    println!("  Type:        {}", transaction.transaction_type());
    println!(
        "  Date:        {}",
        transaction.timestamp().format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Amount:      {}", format_pence(transaction.amount()));
    if let Some(from) = transaction.from_account() {
        println!("  From:        {}", account_label(service, from).await);
    }
    if let Some(to) = transaction.to_account() {
        println!("  To:          {}", account_label(service, to).await);
    }
    if transaction.round_up() > 0 {
        println!("  Round-up:    {}", format_pence(transaction.round_up()));
    }
    if let Some(desc) = transaction.description() {
        println!("  Description: {}", desc);
    }
    println!(
        "  Recorded at: {}",
        transaction.recorded_at().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

async fn account_label(service: &LedgerService, id: AccountId) -> String {
    service
        .get_account_by_id(id)
        .await
        .map(|a| a.name)
        .unwrap_or_else(|_| id.to_string())
}

async fn run_balance_command(service: &LedgerService, account: Option<String>) -> Result<()> {
    match account {
        Some(reference) => {
            let entry = service.current_balance(&reference).await?;
            println!(
                "{}: {} (round-up pot {})",
                entry.account.name,
                format_pence(entry.current_balance),
                format_pence(entry.round_up_pot)
            );
        }
        None => {
            let entries = service.all_balances().await?;
            if entries.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:<10} {:>12} {:>10}", "ACCOUNT", "TYPE", "BALANCE", "POT");
                println!("{}", "-".repeat(55));
                for entry in entries {
                    println!(
                        "{:<20} {:<10} {:>12} {:>10}",
                        truncate(&entry.account.name, 20),
                        entry.account.account_type,
                        format_pence(entry.current_balance),
                        format_pence(entry.round_up_pot)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_report_command(service: &LedgerService, cmd: ReportCommands) -> Result<()> {
    match cmd {
        ReportCommands::Spending { account } => {
            let trends = service.spending_trends(&account).await?;
            if trends.is_empty() {
                println!("No spending recorded for {}.", account);
                return Ok(());
            }

            let total: i64 = trends.iter().map(|t| t.total).sum();
            println!("Spending for {}\n", account);
            println!("{:<24} {:>12} {:>6} {:>7}", "DESTINATION", "AMOUNT", "COUNT", "%");
            println!("{}", "-".repeat(52));
            for trend in &trends {
                let share = if total > 0 {
                    trend.total as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                println!(
                    "{:<24} {:>12} {:>6} {:>6.1}%",
                    truncate(&trend.destination, 24),
                    format_pence(trend.total),
                    trend.count,
                    share
                );
            }
            println!("{}", "-".repeat(52));
            println!("{:<24} {:>12}", "TOTAL", format_pence(total));
        }

        ReportCommands::TopSpenders { limit } => {
            let spenders = service.top_spenders(limit).await?;
            if spenders.is_empty() {
                println!("No spending recorded.");
                return Ok(());
            }

            println!("{:>4} {:<24} {:>12} {:>6}", "RANK", "ACCOUNT", "SPENT", "COUNT");
            println!("{}", "-".repeat(49));
            for (rank, spender) in spenders.iter().enumerate() {
                println!(
                    "{:>4} {:<24} {:>12} {:>6}",
                    rank + 1,
                    truncate(&spender.name, 24),
                    format_pence(spender.total),
                    spender.count
                );
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: ExportType,
    format: ExportFormat,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let summary = match (export_type, format) {
        (ExportType::Accounts, ExportFormat::Csv) => {
            format!("{} accounts", exporter.export_accounts_csv(writer).await?)
        }
        (ExportType::Accounts, ExportFormat::Json) => {
            format!("{} accounts", exporter.export_accounts_json(writer).await?)
        }
        (ExportType::Transactions, ExportFormat::Csv) => {
            format!(
                "{} transactions",
                exporter.export_transactions_csv(writer).await?
            )
        }
        (ExportType::Transactions, ExportFormat::Json) => {
            format!(
                "{} transactions",
                exporter.export_transactions_json(writer).await?
            )
        }
        (ExportType::Full, ExportFormat::Json) => {
            let counts = exporter.export_full_json(writer).await?;
            format!(
                "full ledger: {} accounts, {} businesses, {} transactions",
                counts.accounts, counts.businesses, counts.transactions
            )
        }
        (ExportType::Full, ExportFormat::Csv) => {
            anyhow::bail!("Full export is only available as JSON (use --format json)");
        }
    };

    if output.is_some() {
        eprintln!("Exported {}", summary);
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
        return Ok(());
    }

    println!("Issues found:");
    if report.has_sequence_gaps {
        println!("  - Transaction sequence has gaps");
    }
    if report.invalid_amounts > 0 {
        println!(
            "  - {} transaction(s) with a non-positive amount",
            report.invalid_amounts
        );
    }
    if report.dangling_references > 0 {
        println!(
            "  - {} transaction(s) reference missing accounts",
            report.dangling_references
        );
    }
    for mismatch in &report.pot_mismatches {
        println!(
            "  - {}: round-up pot {} but ledger says {}",
            mismatch.account,
            format_pence(mismatch.pot),
            format_pence(mismatch.expected)
        );
    }
    for negative in &report.negative_balances {
        println!(
            "  - {}: negative balance {} without overdraft",
            negative.account,
            format_pence(negative.balance)
        );
    }
    anyhow::bail!("Ledger integrity check failed");
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Midnight UTC at the start of a YYYY-MM-DD date.
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
    Ok(midnight.and_utc())
}

/// Last microsecond of a YYYY-MM-DD date, for inclusive upper bounds.
fn parse_end_of_day(date_str: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))?;
    let end = date
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
    Ok(end.and_utc())
}
