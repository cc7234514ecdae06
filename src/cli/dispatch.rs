use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use fleet_manager::config::Config;
use fleet_manager::db::{self, Database};
use fleet_manager::email::{Mailer, MemoryMailer, SmtpMailer};
use fleet_manager::models::{
    CustomerContact, HandoverSignature, LegReport, NewBillingItem, NewCustomer, NewJob,
    NewLeaveRequest, NewUser, Payment, Role, User,
};
use fleet_manager::services::{Fleet, HandoverDetails, ProfileUpdate};
use fleet_manager::statement::render_statement;
use fleet_manager::store::memory::MemoryStore;
use fleet_manager::store::{
    AuditFilter, HandoverFilter, InvoiceFilter, JobFilter, Store, UserFilter,
};
use tracing::{info, warn};

use crate::cli::output::output;
use crate::cli::subcommands::{
    AuditCommands, BillingCommands, BillingItemArgs, CustomerArgs, CustomerCommands,
    HandoverCommands, InvoiceCommands, JobCommands, LeaveCommands, LegReportArgs, NewJobArgs,
    UserCommands,
};
use crate::cli::{Cli, Commands, GlobalFlags};

/// Opens the store, resolves the acting user and runs the command.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let flags = cli.global_flags();

    let (store, database): (Arc<dyn Store>, Option<Arc<Database>>) = if flags.memory {
        (Arc::new(MemoryStore::new()), None)
    } else {
        let database = db::init(&config)
            .await
            .context("failed to connect to the database")?;
        let database = Arc::new(database);
        let store: Arc<dyn Store> = database.clone();
        (store, Some(database))
    };

    let mailer: Arc<dyn Mailer> = match config.smtp() {
        Some(smtp) => Arc::new(SmtpMailer::new(&smtp).context("invalid SMTP settings")?),
        None => {
            warn!("SMTP is not configured; outgoing mail is kept in memory only");
            Arc::new(MemoryMailer::new())
        }
    };
    let fleet = Fleet::new(store, mailer);
    info!(backend = fleet.store().backend(), "store ready");

    let bootstrapping = matches!(
        cli.command,
        Commands::User {
            action: UserCommands::Bootstrap { .. }
        }
    );
    if flags.memory && !bootstrapping {
        let admin = fleet
            .users
            .bootstrap(NewUser {
                email: "admin@localhost".to_string(),
                name: "Local Admin".to_string(),
                phone: None,
                role: Role::SuperAdmin,
                license_number: None,
            })
            .await?;
        info!(user_id = admin.id, "seeded in-memory administrator");
    }

    match cli.command {
        Commands::Migrate => {
            if database.is_some() {
                println!("migrations applied");
            } else {
                println!("nothing to migrate for the in-memory store");
            }
            Ok(())
        }
        Commands::User {
            action: UserCommands::Bootstrap { email, name },
        } => {
            let user = fleet
                .users
                .bootstrap(NewUser {
                    email,
                    name,
                    phone: None,
                    role: Role::SuperAdmin,
                    license_number: None,
                })
                .await?;
            output(&user, flags.json)
        }
        command => {
            let actor = resolve_actor(&fleet, &flags).await?;
            dispatch(command, &fleet, &actor, database.as_deref(), &flags).await
        }
    }
}

async fn resolve_actor(fleet: &Fleet, flags: &GlobalFlags) -> anyhow::Result<User> {
    let id = match (flags.actor, flags.memory) {
        (Some(id), _) => id,
        // The seeded administrator is always the first user.
        (None, true) => 1,
        (None, false) => bail!("pass --as <USER_ID> to say who is acting"),
    };
    let user = fleet
        .store()
        .get_user(id)
        .await
        .with_context(|| format!("unknown acting user {id}"))?;
    if !user.is_active() {
        bail!("user {id} is not active");
    }
    Ok(user)
}

/// Dispatch a parsed command to the corresponding handler.
async fn dispatch(
    command: Commands,
    fleet: &Fleet,
    actor: &User,
    database: Option<&Database>,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Job { action } => job(action, fleet, actor, flags).await,
        Commands::Billing { action } => billing(action, fleet, actor, flags).await,
        Commands::Invoice { action } => invoice(action, fleet, actor, flags).await,
        Commands::Handover { action } => handover(action, fleet, actor, flags).await,
        Commands::Leave { action } => leave(action, fleet, actor, flags).await,
        Commands::User { action } => user(action, fleet, actor, flags).await,
        Commands::Customer { action } => customer(action, fleet, actor, flags).await,
        Commands::Audit { action } => audit(action, fleet, actor, flags).await,
        Commands::Watch => watch(fleet, actor, database, flags).await,
        Commands::Migrate => bail!("migrate is handled before dispatch"),
    }
}

fn new_job(args: NewJobArgs) -> NewJob {
    NewJob {
        customer_id: args.customer,
        customer_reference: args.reference,
        make: args.make,
        model: args.model,
        registration: args.registration,
        chassis_number: args.chassis,
        color: args.color,
        year: args.year,
        collection_address: args.collection_address,
        collection_postcode: args.collection_postcode,
        collection_contact_name: args.collection_contact,
        delivery_address: args.delivery_address,
        delivery_postcode: args.delivery_postcode,
        delivery_contact_name: args.delivery_contact,
        ..NewJob::default()
    }
}

fn leg_report(args: LegReportArgs) -> LegReport {
    LegReport {
        mileage: args.mileage,
        fuel_level: args.fuel,
        notes: args.notes,
        photos: args.photos,
        signature: args.signature,
    }
}

async fn job(action: JobCommands, fleet: &Fleet, actor: &User, flags: &GlobalFlags) -> anyhow::Result<()> {
    let jobs = &fleet.jobs;
    match action {
        JobCommands::Create(args) => output(&jobs.create_job(actor, new_job(args)).await?, flags.json),
        JobCommands::Get { id } => output(&jobs.get_job(actor, id).await?, flags.json),
        JobCommands::List {
            status,
            driver,
            customer,
            limit,
        } => {
            let filter = JobFilter {
                status,
                driver_id: driver,
                customer_id: customer,
                limit,
            };
            output(&jobs.list_jobs(actor, &filter).await?, flags.json)
        }
        JobCommands::Allocate { id, driver } => output(&jobs.allocate(actor, id, driver).await?, flags.json),
        JobCommands::Unallocate { id } => output(&jobs.unallocate(actor, id).await?, flags.json),
        JobCommands::StartCollection { id } => output(&jobs.start_collection(actor, id).await?, flags.json),
        JobCommands::CompleteCollection { id, report } => output(
            &jobs.complete_collection(actor, id, leg_report(report)).await?,
            flags.json,
        ),
        JobCommands::StartDelivery { id } => output(&jobs.start_delivery(actor, id).await?, flags.json),
        JobCommands::CompleteDelivery { id, report } => output(
            &jobs.complete_delivery(actor, id, leg_report(report)).await?,
            flags.json,
        ),
        JobCommands::Cancel { id } => output(&jobs.cancel(actor, id).await?, flags.json),
        JobCommands::Abort { id, reason } => output(&jobs.abort(actor, id, reason).await?, flags.json),
        JobCommands::Note { id, content } => output(&jobs.add_note(actor, id, &content).await?, flags.json),
        JobCommands::Notes { id } => output(&jobs.list_notes(actor, id).await?, flags.json),
        JobCommands::Duplicate { id } => output(&jobs.duplicate_job(actor, id).await?, flags.json),
        JobCommands::Stats => output(&jobs.dashboard_stats(actor).await?, flags.json),
    }
}

fn billing_item(job_id: i32, args: BillingItemArgs) -> NewBillingItem {
    NewBillingItem {
        job_id,
        item_type: args.item_type,
        description: args.description,
        quantity: args.quantity,
        unit_price: args.unit_price,
        is_chargeable: !args.non_chargeable,
        category: args.category,
        date: args.date.unwrap_or_else(|| Utc::now().date_naive()),
        receipt_url: args.receipt_url,
        notes: args.notes,
    }
}

async fn billing(
    action: BillingCommands,
    fleet: &Fleet,
    actor: &User,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let billing = &fleet.billing;
    match action {
        BillingCommands::Add { job, item } => {
            output(&billing.add_item(actor, billing_item(job, item)).await?, flags.json)
        }
        BillingCommands::Update { id, item } => {
            let existing = fleet.store().get_billing_item(id).await?;
            let changes = billing_item(existing.job_id, item);
            output(&billing.update_item(actor, id, changes).await?, flags.json)
        }
        BillingCommands::Delete { id } => {
            billing.delete_item(actor, id).await?;
            println!("billing item {id} deleted");
            Ok(())
        }
        BillingCommands::List { job } => output(&billing.items_for_job(actor, job).await?, flags.json),
        BillingCommands::Summary { job } => output(&billing.summary(actor, job).await?, flags.json),
        BillingCommands::Status { job } => output(&billing.job_billing_status(actor, job).await?, flags.json),
        BillingCommands::Settings => output(&billing.settings(actor).await?, flags.json),
        BillingCommands::SetSettings {
            vat_rate,
            payment_terms,
            prefix,
            next_number,
        } => {
            let mut settings = billing.settings(actor).await?;
            if let Some(vat_rate) = vat_rate {
                settings.vat_rate = vat_rate;
            }
            if let Some(days) = payment_terms {
                settings.payment_terms_days = days;
            }
            if let Some(prefix) = prefix {
                settings.invoice_prefix = prefix;
            }
            if let Some(next) = next_number {
                settings.next_invoice_number = next;
            }
            output(&billing.update_settings(actor, settings).await?, flags.json)
        }
    }
}

async fn invoice(
    action: InvoiceCommands,
    fleet: &Fleet,
    actor: &User,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let billing = &fleet.billing;
    let today = Utc::now().date_naive();
    match action {
        InvoiceCommands::Create { job } => output(&billing.create_invoice_from_job(actor, job).await?, flags.json),
        InvoiceCommands::Get { id } => output(&billing.get_invoice(actor, id).await?, flags.json),
        InvoiceCommands::Show { id } => {
            let invoice = billing.get_invoice(actor, id).await?;
            let settings = billing.settings(actor).await?;
            print!("{}", render_statement(&invoice, &settings));
            Ok(())
        }
        InvoiceCommands::List {
            job,
            customer,
            status,
            limit,
        } => {
            let filter = InvoiceFilter {
                job_id: job,
                customer_id: customer,
                status,
                limit,
            };
            output(&billing.list_invoices(actor, &filter).await?, flags.json)
        }
        InvoiceCommands::Status { id, status } => output(&billing.set_status(actor, id, status).await?, flags.json),
        InvoiceCommands::Pay {
            id,
            amount,
            reference,
            method,
            date,
        } => {
            let payment = Payment {
                amount,
                reference,
                method,
                date,
            };
            output(&billing.record_payment(actor, id, payment).await?, flags.json)
        }
        InvoiceCommands::MarkOverdue { today: on } => {
            let changed = billing.mark_overdue(actor, on.unwrap_or(today)).await?;
            output(&changed, flags.json)
        }
        InvoiceCommands::Email { id } => output(&billing.email_invoice(actor, id).await?, flags.json),
        InvoiceCommands::Remind { id } => output(&billing.send_reminder(actor, id).await?, flags.json),
        InvoiceCommands::Delete { id } => {
            billing.delete_invoice(actor, id).await?;
            println!("invoice {id} deleted");
            Ok(())
        }
        InvoiceCommands::Stats { today: on } => {
            output(&billing.dashboard_stats(actor, on.unwrap_or(today)).await?, flags.json)
        }
    }
}

fn signature(signed: Option<String>, skipped: Option<String>) -> anyhow::Result<HandoverSignature> {
    match (signed, skipped) {
        (Some(data), None) => Ok(HandoverSignature::Signed(data)),
        (None, Some(note)) => Ok(HandoverSignature::Skipped(note)),
        _ => bail!("give either a signature or a skip note"),
    }
}

async fn handover(
    action: HandoverCommands,
    fleet: &Fleet,
    actor: &User,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let handovers = &fleet.handovers;
    match action {
        HandoverCommands::Create {
            job,
            location,
            odometer,
            reason,
            other_reason,
            notes,
            to,
            from_signature,
            from_skip,
            to_signature,
            to_skip,
        } => {
            let details = HandoverDetails {
                job_id: job,
                location,
                odometer,
                reason,
                other_reason,
                notes,
            };
            let mut draft = handovers.begin(actor, details).await?;
            handovers.choose_driver(&mut draft, to).await?;
            draft.confirm(
                signature(from_signature, from_skip)?,
                signature(to_signature, to_skip)?,
            )?;
            let (handover, _job) = handovers.submit(actor, draft).await?;
            output(&handover, flags.json)
        }
        HandoverCommands::Get { id } => output(&handovers.get(actor, id).await?, flags.json),
        HandoverCommands::List { job, driver, from, to } => {
            let filter = HandoverFilter {
                job_id: job,
                driver_id: driver,
                from,
                to,
            };
            output(&handovers.list(actor, &filter).await?, flags.json)
        }
    }
}

async fn leave(action: LeaveCommands, fleet: &Fleet, actor: &User, flags: &GlobalFlags) -> anyhow::Result<()> {
    let leave = &fleet.leave;
    match action {
        LeaveCommands::Submit {
            driver,
            leave_type,
            start,
            end,
            notes,
        } => {
            let request = NewLeaveRequest {
                driver_id: driver.unwrap_or(actor.id),
                leave_type,
                start_date: start,
                end_date: end,
                notes,
            };
            output(&leave.submit(actor, request).await?, flags.json)
        }
        LeaveCommands::Approve { id, notes } => output(&leave.approve(actor, id, notes).await?, flags.json),
        LeaveCommands::Deny { id, notes } => output(&leave.deny(actor, id, notes).await?, flags.json),
        LeaveCommands::Cancel { id } => output(&leave.cancel(actor, id).await?, flags.json),
        LeaveCommands::Get { id } => output(&leave.get(actor, id).await?, flags.json),
        LeaveCommands::List { pending: true, .. } => output(&leave.list_pending(actor).await?, flags.json),
        LeaveCommands::List {
            driver: Some(driver),
            ..
        } => output(&leave.list_for_driver(actor, driver).await?, flags.json),
        LeaveCommands::List { .. } => output(&leave.list_all(actor).await?, flags.json),
    }
}

async fn user(action: UserCommands, fleet: &Fleet, actor: &User, flags: &GlobalFlags) -> anyhow::Result<()> {
    let users = &fleet.users;
    match action {
        UserCommands::Bootstrap { .. } => bail!("bootstrap is handled before dispatch"),
        UserCommands::Create {
            email,
            name,
            role,
            phone,
            license,
        } => {
            let new = NewUser {
                email,
                name,
                phone,
                role,
                license_number: license,
            };
            output(&users.create_user(actor, new).await?, flags.json)
        }
        UserCommands::Get { id } => output(&users.get(actor, id).await?, flags.json),
        UserCommands::List { role, active } => {
            let filter = UserFilter {
                role,
                active_only: active,
            };
            output(&users.list(actor, &filter).await?, flags.json)
        }
        UserCommands::Update {
            id,
            name,
            phone,
            license,
        } => {
            let update = ProfileUpdate {
                name,
                phone,
                license_number: license,
            };
            output(&users.update_profile(actor, id, update).await?, flags.json)
        }
        UserCommands::Role { id, role } => output(&users.change_role(actor, id, role).await?, flags.json),
        UserCommands::Grant { id, permission } => output(&users.grant(actor, id, permission).await?, flags.json),
        UserCommands::Revoke { id, permission } => output(&users.revoke(actor, id, permission).await?, flags.json),
        UserCommands::Activate { id } => output(&users.set_active(actor, id, true).await?, flags.json),
        UserCommands::Deactivate { id } => output(&users.set_active(actor, id, false).await?, flags.json),
    }
}

fn new_customer(args: CustomerArgs) -> NewCustomer {
    let contacts = match (args.contact_name, args.contact_email) {
        (Some(name), Some(email)) => vec![CustomerContact {
            name,
            position: None,
            email,
            phone: args.contact_phone,
            is_primary: true,
        }],
        _ => Vec::new(),
    };
    NewCustomer {
        name: args.name,
        category: args.category,
        address: args.address,
        city: args.city,
        postcode: args.postcode,
        country: args.country,
        website: args.website,
        notes: args.notes,
        contacts,
    }
}

async fn customer(
    action: CustomerCommands,
    fleet: &Fleet,
    actor: &User,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let customers = &fleet.customers;
    match action {
        CustomerCommands::Create(args) => output(&customers.create(actor, new_customer(args)).await?, flags.json),
        CustomerCommands::Update { id, details } => {
            output(&customers.update(actor, id, new_customer(details)).await?, flags.json)
        }
        CustomerCommands::Get { id } => output(&customers.get(actor, id).await?, flags.json),
        CustomerCommands::List { category: Some(category) } => {
            output(&customers.list_by_category(actor, &category).await?, flags.json)
        }
        CustomerCommands::List { category: None } => output(&customers.list_active(actor).await?, flags.json),
        CustomerCommands::Deactivate { id } => output(&customers.deactivate(actor, id).await?, flags.json),
    }
}

async fn audit(action: AuditCommands, fleet: &Fleet, actor: &User, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        AuditCommands::List {
            action,
            user,
            resource,
            from,
            to,
            limit,
        } => {
            let filter = AuditFilter {
                action,
                user_id: user,
                resource,
                from,
                to,
                limit: Some(limit),
            };
            output(&fleet.audit.list(actor, &filter).await?, flags.json)
        }
        AuditCommands::Get { id } => output(&fleet.audit.get(actor, id).await?, flags.json),
    }
}

/// Prints the visible job list, then again after every change until Ctrl-C.
async fn watch(
    fleet: &Fleet,
    actor: &User,
    database: Option<&Database>,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let listener = match database {
        Some(database) => Some(database.forward_job_notifications(fleet.feed.clone()).await?),
        None => None,
    };

    let mut watch = fleet.watch_jobs(actor).await?;
    info!(scope = ?watch.scope(), "watching jobs");
    output(&watch.current(), flags.json)?;

    loop {
        tokio::select! {
            snapshot = watch.changed() => match snapshot {
                Some(jobs) => {
                    println!();
                    output(&jobs, flags.json)?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(listener) = listener {
        listener.abort();
    }
    Ok(())
}
