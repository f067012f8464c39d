//! Text rendering of snapshots.

use chrono::Utc;
use gravitywatch_core::{format_delta, QuotaGroup, QuotaSnapshot};

pub fn snapshot(snapshot: &QuotaSnapshot) {
    if let Some(user) = &snapshot.user_info {
        let who = user.email.as_deref().or(user.name.as_deref()).unwrap_or("unknown user");
        match &user.plan_name {
            Some(plan) => println!("{} ({})", who, plan),
            None => println!("{}", who),
        }
    }
    if let Some(credits) = &snapshot.prompt_credits {
        println!(
            "Prompt credits: {:.0} / {:.0} ({:.0}% left)",
            credits.available, credits.monthly, credits.remaining_percentage
        );
    }
    println!();

    match &snapshot.groups {
        Some(groups) => self::groups(groups),
        None => models(snapshot),
    }
}

fn models(snapshot: &QuotaSnapshot) {
    if snapshot.models.is_empty() {
        println!("No model quotas reported.");
        return;
    }

    println!("{:<36} {:>9} {:>12}", "MODEL", "REMAINING", "RESETS IN");
    println!("{}", "-".repeat(59));
    for model in &snapshot.models {
        println!(
            "{:<36} {:>9} {:>12}",
            truncate(&model.label, 36),
            percent(model.remaining_percentage),
            model.time_until_reset_formatted
        );
    }
}

pub fn groups(groups: &[QuotaGroup]) {
    if groups.is_empty() {
        println!("No groups.");
        return;
    }

    for group in groups {
        let countdown = format_delta((group.reset_time - Utc::now()).num_milliseconds());
        let marker = if group.is_exhausted { " [exhausted]" } else { "" };
        println!(
            "{:<36} {:>9} {:>12}{}",
            truncate(&group.group_name, 36),
            percent(Some(group.remaining_percentage)),
            countdown,
            marker
        );
        for model in &group.models {
            println!("  - {} ({})", model.label, model.model_id);
        }
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "?".to_string(), |p| format!("{:.1}%", p))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
