use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bill_domain::bill::{format_amount, parse_due_date, DUE_DATE_FORMAT};
use bill_domain::clock::{Clock, FixedClock, SystemClock};
use bill_domain::config::ReminderConfig;
use bill_domain::dispatcher::{DispatchOutcome, RecoveryReport};
use bill_domain::notifications::NotificationSink;
use bill_domain::overview::{self, BillFilter, SortOrder};
use bill_domain::{Bill, BillId, BillService, NewBill, Recurrence};
use bill_store::{SqliteAlarmFacility, SqliteBillStore};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "billminder", version, about = "Track bills and get reminded before they are due")]
pub struct Cli {
    /// Treat this local time as "now" (YYYY-MM-DDTHH:MM[:SS])
    #[arg(long, global = true, value_parser = parse_now)]
    pub now: Option<NaiveDateTime>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a new bill and schedule its reminder
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        amount: f64,

        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: NaiveDate,

        /// Recurrence such as none, 1d, 2w, 1m or 1y
        #[arg(long, value_parser = parse_recurrence, default_value = "none")]
        repeat: Recurrence,

        #[arg(long, default_value_t = false)]
        paid: bool,
    },

    /// Change fields of an existing bill
    Edit {
        id: BillId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        amount: Option<f64>,

        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,

        #[arg(long, value_parser = parse_recurrence)]
        repeat: Option<Recurrence>,

        #[arg(long)]
        paid: Option<bool>,
    },

    /// Mark a bill paid, creating the next occurrence if it recurs
    Pay { id: BillId },

    /// Remove a bill and its reminder
    Delete { id: BillId },

    /// Print one bill
    Show { id: BillId },

    /// List bills
    List {
        #[arg(long, default_value_t = false)]
        unpaid: bool,

        #[arg(long, default_value_t = false)]
        overdue: bool,

        #[arg(long, default_value_t = false)]
        this_month: bool,

        #[arg(long, value_enum, default_value_t = SortArg::Due)]
        sort: SortArg,
    },

    /// Totals for the current month
    Summary,

    /// Simulate a device restart: drop pending wake-ups and rebuild them
    Boot,

    /// Fire every pending wake-up whose time has come
    Tick,

    /// Fire the pending wake-up of one bill now
    Fire { id: BillId },

    /// Re-register reminders for every unpaid bill
    Resync,

    /// List pending wake-ups
    Pending,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Due,
    Amount,
    Name,
    Status,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Due => SortOrder::DueDate,
            SortArg::Amount => SortOrder::Amount,
            SortArg::Name => SortOrder::Name,
            SortArg::Status => SortOrder::Status,
        }
    }
}

/// The host: a bill service over SQLite plus the alarm facility it registers
/// wake-ups with, kept in the same database file.
pub struct App {
    service: BillService,
    alarms: Arc<SqliteAlarmFacility>,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn open(
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let store = SqliteBillStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?;
        let alarms = Arc::new(
            SqliteAlarmFacility::open(&config.db_path)
                .with_context(|| format!("opening wake-ups in {}", config.db_path.display()))?,
        );
        let service = BillService::builder()
            .with_store(Arc::new(store))
            .with_alarm_facility(alarms.clone())
            .with_notification_sink(sink)
            .with_clock(clock.clone())
            .with_config(config.reminders.clone())
            .build()?;
        Ok(Self {
            service,
            alarms,
            clock,
        })
    }

    pub fn service(&self) -> &BillService {
        &self.service
    }

    pub fn alarms(&self) -> &SqliteAlarmFacility {
        &self.alarms
    }

    pub fn execute(&self, command: Command, out: &mut dyn Write) -> Result<()> {
        let config = self.service.config();
        match command {
            Command::Add {
                name,
                amount,
                due,
                repeat,
                paid,
            } => {
                let bill = self.service.add_bill(
                    NewBill::new(name, amount, due)
                        .with_recurrence(repeat)
                        .paid(paid),
                )?;
                writeln!(out, "Added {}", describe(&bill, self.clock.today(), config))?;
                self.print_reminder(bill.id, out)?;
            }
            Command::Edit {
                id,
                name,
                amount,
                due,
                repeat,
                paid,
            } => {
                let mut bill = self.require(id)?;
                if let Some(name) = name {
                    bill.name = name;
                }
                if let Some(amount) = amount {
                    bill.amount = amount;
                }
                if let Some(due) = due {
                    bill.due_date = due.format(DUE_DATE_FORMAT).to_string();
                }
                if let Some(repeat) = repeat {
                    bill.recurrence = repeat;
                }
                if let Some(paid) = paid {
                    bill.is_paid = paid;
                }
                let update = self.service.update_bill(bill)?;
                writeln!(out, "Updated {}", describe(&update.bill, self.clock.today(), config))?;
                self.print_next(update.next.as_ref(), out)?;
            }
            Command::Pay { id } => {
                let update = self.service.mark_paid(id)?;
                writeln!(out, "Paid {}", describe(&update.bill, self.clock.today(), config))?;
                self.print_next(update.next.as_ref(), out)?;
            }
            Command::Delete { id } => {
                if self.service.delete_bill(id)? {
                    writeln!(out, "Deleted bill #{id}")?;
                } else {
                    writeln!(out, "No bill #{id}")?;
                }
            }
            Command::Show { id } => {
                let bill = self.require(id)?;
                writeln!(out, "{}", describe(&bill, self.clock.today(), config))?;
                self.print_reminder(id, out)?;
            }
            Command::List {
                unpaid,
                overdue,
                this_month,
                sort,
            } => {
                let filter = BillFilter {
                    unpaid,
                    overdue,
                    this_month,
                };
                let bills = self.service.list_bills(filter, sort.into())?;
                if bills.is_empty() {
                    writeln!(out, "No bills")?;
                }
                let today = self.clock.today();
                for bill in &bills {
                    writeln!(out, "{}", describe(bill, today, config))?;
                }
            }
            Command::Summary => {
                let summary = self.service.summary()?;
                writeln!(
                    out,
                    "Due this month: {}\nOverdue: {}\nUnpaid: {} of {}",
                    format_amount(summary.month_total, &config.currency_suffix),
                    summary.overdue_count,
                    summary.unpaid_count,
                    summary.total_count
                )?;
            }
            Command::Boot => {
                self.alarms.clear()?;
                let report = self.service.handle_restart();
                write_report("Recovered", &report, out)?;
            }
            Command::Tick => {
                let now = self.clock.now();
                let due = self.alarms.take_due(now)?;
                info!(count = due.len(), %now, "firing due wake-ups");
                let mut delivered = 0;
                for request in &due {
                    if let DispatchOutcome::Delivered(_) = self.service.handle_wakeup(&request.payload) {
                        delivered += 1;
                    }
                }
                writeln!(out, "Fired {} wake-up(s), {} notification(s)", due.len(), delivered)?;
            }
            Command::Fire { id } => {
                let Some(request) = self.alarms.take(id)? else {
                    bail!("no pending reminder for bill #{id}");
                };
                match self.service.handle_wakeup(&request.payload) {
                    DispatchOutcome::Delivered(_) => {}
                    DispatchOutcome::SuppressedPaid => {
                        writeln!(out, "Reminder for #{id} suppressed: bill is paid")?;
                    }
                    DispatchOutcome::SuppressedMissing => {
                        writeln!(out, "Reminder for #{id} suppressed: bill no longer exists")?;
                    }
                }
            }
            Command::Resync => {
                let report = self.service.resync_reminders();
                write_report("Rescheduled", &report, out)?;
            }
            Command::Pending => {
                let pending = self.alarms.pending()?;
                if pending.is_empty() {
                    writeln!(out, "No pending reminders")?;
                }
                for request in pending {
                    writeln!(
                        out,
                        "#{} {} at {} ({})",
                        request.key,
                        request.payload.name,
                        request.fire_at.format("%Y-%m-%d %H:%M"),
                        request.timing
                    )?;
                }
            }
        }
        Ok(())
    }

    fn require(&self, id: BillId) -> Result<Bill> {
        match self.service.get_bill(id)? {
            Some(bill) => Ok(bill),
            None => bail!("bill #{id} not found"),
        }
    }

    fn print_reminder(&self, id: BillId, out: &mut dyn Write) -> Result<()> {
        let pending = self.alarms.pending()?;
        match pending.iter().find(|request| request.key == id) {
            Some(request) => writeln!(
                out,
                "  reminder at {}",
                request.fire_at.format("%Y-%m-%d %H:%M")
            )?,
            None => writeln!(out, "  no reminder scheduled")?,
        }
        Ok(())
    }

    fn print_next(&self, next: Option<&Bill>, out: &mut dyn Write) -> Result<()> {
        if let Some(next) = next {
            writeln!(
                out,
                "Next occurrence {}",
                describe(next, self.clock.today(), self.service.config())
            )?;
            self.print_reminder(next.id, out)?;
        }
        Ok(())
    }
}

/// Open the app for `config` and run one command, writing to stdout.
pub fn run(cli: Cli, config: AppConfig, sink: Arc<dyn NotificationSink>) -> Result<()> {
    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(FixedClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let app = App::open(&config, clock, sink)?;
    let mut stdout = std::io::stdout().lock();
    app.execute(cli.command, &mut stdout)
}

/// One listing line, e.g. `#3    due soon   12 Mar 2024       30.00 DH  Water (2 days left)`.
pub fn describe(bill: &Bill, today: NaiveDate, config: &ReminderConfig) -> String {
    let status = bill.status(today, config.due_soon_days);
    let repeat = if bill.is_recurring() {
        format!(" [{}]", bill.recurrence)
    } else {
        String::new()
    };
    let remaining = match overview::days_remaining(bill, today) {
        Some(days) if !bill.is_paid && days > 0 => format!(" ({days} days left)"),
        Some(days) if !bill.is_paid && days < 0 => format!(" ({} days late)", -days),
        _ => String::new(),
    };
    format!(
        "#{:<4} {:<9}  {}  {:>14}  {}{}{}",
        bill.id,
        status.label(),
        bill.formatted_due_date(),
        bill.formatted_amount(&config.currency_suffix),
        bill.name,
        repeat,
        remaining
    )
}

fn write_report(verb: &str, report: &RecoveryReport, out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        "{verb} {} of {} reminder(s); {} skipped, {} failed",
        report.scheduled, report.examined, report.skipped, report.failed
    )?;
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_due_date(raw).map_err(|err| err.to_string())
}

fn parse_now(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .map_err(|err| format!("expected YYYY-MM-DDTHH:MM: {err}"))
}

fn parse_recurrence(raw: &str) -> Result<Recurrence, String> {
    Recurrence::parse_token(raw).ok_or_else(|| format!("unrecognised recurrence `{raw}`"))
}
