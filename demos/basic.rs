//! Basic usage of the floodgate crate.

use floodgate::{AdmissionConfig, AdmissionController, Outcome};

fn main() {
    println!("=== Basic Admission Example ===\n");

    // Example 1: one identity through window, cooldown and reset
    reference_scenario();

    println!("\n{}\n", "=".repeat(50));

    // Example 2: the window slides
    sliding_window();

    println!("\n{}\n", "=".repeat(50));

    // Example 3: counters
    metrics_example();
}

fn describe(now: u64, outcome: Outcome) {
    match outcome {
        Outcome::Admitted => println!("   t={now:>7} ms - ✅ Admitted"),
        Outcome::CooldownArmed { until } => {
            println!("   t={now:>7} ms - ❌ Window full, cooling down until {until}")
        }
        Outcome::CoolingDown { .. } => {
            let left = outcome.retry_after(now).unwrap_or_default();
            println!("   t={now:>7} ms - ❌ Cooling down ({} s left)", left.as_secs())
        }
        Outcome::AtCapacity => println!("   t={now:>7} ms - ❌ Controller full"),
    }
}

fn reference_scenario() {
    println!("1. Strict profile (5 per minute, 5 minute cooldown):");

    let controller = AdmissionController::<String>::new(AdmissionConfig::strict());

    for now in [0, 1, 2, 3, 4, 5, 150_000, 300_006] {
        describe(now, controller.check_detailed("u1", now));
    }

    println!("   Window after reset: {} event(s)", controller.window_len("u1"));
}

fn sliding_window() {
    println!("2. Sliding window:");

    let config = AdmissionConfig::strict();
    println!(
        "   Budget: {} events / {} s (~{:.3} events/s)",
        config.max_events,
        config.timeframe().as_secs(),
        config.effective_rate_per_second()
    );

    for sixth in [59_000, 61_000] {
        let controller = AdmissionController::<String>::new(config.clone());
        for now in [0, 10, 20, 30, 40] {
            controller.check("u", now);
        }
        print!("   sixth event at {sixth}:");
        describe(sixth, controller.check_detailed("u", sixth));
    }
}

fn metrics_example() {
    println!("3. Metrics:");

    let controller = AdmissionController::<String>::new(AdmissionConfig::new(3, 1_000, 5_000));

    for now in 0..20 {
        controller.check("noisy", now);
    }
    for i in 0..5 {
        controller.check(&format!("quiet-{i}"), 100);
    }

    let metrics = controller.metrics();
    println!("{}", metrics.summary());
    println!("   Suggested action: {}", metrics.health_status().suggested_action());
    println!();
    println!("{}", controller.stats());
}
