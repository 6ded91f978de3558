use colored::*;
use coopmarket_marketplace::{
    CooperativeStats, ErrorCategory, ListingStatus, MarketError, Member, MemberStats,
    MineralListing, Notice, QueuedSubmission, SubmissionRecord, VerificationStatus,
};
use coopmarket_remote::{RealtimeStatus, ViewState};

pub fn notice(notice: &Notice) {
    println!("{}", notice.message().green());
}

pub fn failure(message: &str) {
    eprintln!("{}", message.red());
}

pub fn exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Authorization => 2,
        ErrorCategory::Configuration => 3,
        _ => 1,
    }
}

/// Print a command failure and return the exit code for it.
///
/// Blocking marketplace errors get a prefix naming what stopped the command.
/// Everything else is a plain notice.
pub fn error(error: &anyhow::Error) -> i32 {
    let Some(market) = error.downcast_ref::<MarketError>() else {
        failure(&format!("{error:#}"));
        return 1;
    };

    let category = market.category();
    if market.is_blocking() {
        let prefix = match category {
            ErrorCategory::Configuration => "account not set up:",
            _ => "access denied:",
        };
        eprintln!("{} {market}", prefix.red().bold());
        if *market == MarketError::NotAuthenticated {
            eprintln!("run `coopmarket login` first");
        }
    } else {
        eprintln!("{}", market.to_string().yellow());
    }
    exit_code(category)
}

fn date<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn listing_status(status: ListingStatus) -> ColoredString {
    match status {
        ListingStatus::Available => status.to_string().green(),
        _ => status.to_string().normal(),
    }
}

fn verification_status(status: VerificationStatus) -> ColoredString {
    match status {
        VerificationStatus::Pending => status.to_string().yellow(),
        VerificationStatus::Verified => status.to_string().green(),
        VerificationStatus::Rejected => status.to_string().red(),
    }
}

pub fn members(members: &[Member]) {
    if members.is_empty() {
        println!("No members yet");
        return;
    }
    println!(
        "{:<12} {:<30} {:<16} {:<10} {:<25}",
        "Member ID", "Full name", "Phone", "Status", "Added"
    );
    println!("{}", "-".repeat(96));
    for member in members {
        println!(
            "{:<12} {:<30} {:<16} {:<10} {:<25}",
            member.member_code,
            member.full_name,
            member.phone_number.as_deref().unwrap_or("-"),
            member.status,
            date(member.created_at)
        );
    }
}

pub fn listings(listings: &[MineralListing]) {
    if listings.is_empty() {
        println!("No listings found");
        return;
    }
    println!(
        "{:<38} {:<14} {:>10} {:<5} {:<8} {:>10} {:<10}",
        "ID", "Mineral", "Quantity", "Unit", "Grade", "Price", "Status"
    );
    println!("{}", "-".repeat(102));
    for listing in listings {
        println!(
            "{:<38} {:<14} {:>10} {:<5} {:<8} {:>10.2} {:<10}",
            listing.id,
            listing.mineral_type,
            listing.quantity,
            listing.unit,
            listing.quality_grade.as_deref().unwrap_or("-"),
            listing.price_per_unit,
            listing_status(listing.status)
        );
    }
}

pub fn queue(queue: &[QueuedSubmission]) {
    if queue.is_empty() {
        println!("No pending submissions");
        return;
    }
    println!(
        "{:<38} {:<24} {:<14} {:>10} {:<25}",
        "Submission", "Member", "Mineral", "Quantity", "Submitted"
    );
    println!("{}", "-".repeat(114));
    for submission in queue {
        let member = submission
            .member
            .as_ref()
            .map(|m| format!("{} ({})", m.full_name, m.member_code))
            .unwrap_or_else(|| "-".to_string());
        let (mineral, unit) = submission
            .mineral_listing
            .as_ref()
            .map(|l| (l.mineral_type.as_str(), l.unit.as_str()))
            .unwrap_or(("-", ""));
        println!(
            "{:<38} {:<24} {:<14} {:>10} {:<25}",
            submission.id,
            member,
            mineral,
            format!("{} {unit}", submission.quantity),
            date(submission.submission_date)
        );
    }
}

pub fn history(history: &[SubmissionRecord]) {
    if history.is_empty() {
        println!("No submissions yet");
        return;
    }
    println!(
        "{:<14} {:>12} {:<10} {:<25}",
        "Mineral", "Quantity", "Status", "Submitted"
    );
    println!("{}", "-".repeat(64));
    for record in history {
        let (mineral, unit) = record
            .mineral_listing
            .as_ref()
            .map(|l| (l.mineral_type.as_str(), l.unit.as_str()))
            .unwrap_or(("-", ""));
        println!(
            "{:<14} {:>12} {:<10} {:<25}",
            mineral,
            format!("{} {unit}", record.quantity),
            verification_status(record.verification_status),
            date(record.submission_date)
        );
    }
}

pub fn member_stats(stats: &[MemberStats]) {
    for stats in stats {
        println!("Listings:    {}", stats.total_listings);
        println!("Submissions: {}", stats.total_submissions);
        println!("Quantity:    {}", stats.total_quantity);
    }
}

pub fn cooperative_stats(stats: &[CooperativeStats]) {
    for stats in stats {
        println!("Members:     {}", stats.total_members);
        println!("Submissions: {}", stats.total_submissions);
        println!("Quantity:    {}", stats.total_quantity);
    }
}

/// One snapshot of a live view, as printed by `watch`.
pub fn snapshot<T>(label: &str, state: &ViewState<T>, rows: impl Fn(&[T])) {
    if state.loading {
        return;
    }
    println!("\n=== {} (revision {}) ===", label.to_uppercase(), state.revision);
    if let RealtimeStatus::Degraded(reason) = &state.realtime {
        println!("{}", format!("live updates unavailable: {reason}").yellow());
    }
    if let Some(error) = &state.error {
        failure(error);
    }
    rows(&state.rows);
}
