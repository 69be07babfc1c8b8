use console::Style;
use flume::Receiver;

use crate::reporter::CaseOutcome;
use crate::reporter::CaseRecord;

pub struct OutPutter;

impl OutPutter {
    /// Prints one line per case as records arrive, then a summary once the
    /// channel closes.
    pub async fn start(rx: Receiver<CaseRecord>, suite: String, n_cases: usize) {
        let style = Style::new().bold().cyan();
        let open_text = format!("Running suite: {suite} Found {n_cases} cases: Running...");

        println!("{}", style.apply_to(open_text));
        let mut i = 1;
        let mut failed_cases: Vec<CaseRecord> = vec![];
        while let Ok(record) = rx.recv_async().await {
            let timing = console::style(format!("({} ms)", record.duration_ms)).dim();

            if record.passed() {
                println!(
                    "[{i}/{n_cases}] {}  {} {} {timing} {}",
                    console::style("✔").green().bold(),
                    record.method,
                    record.name,
                    console::style("PASS!").green().bold(),
                );
            } else {
                println!(
                    "[{i}/{n_cases}] {}  {} {} {timing} {}",
                    console::style("╳").red().bold(),
                    record.method,
                    record.name,
                    console::style("FAILED!").red().bold(),
                );
                failed_cases.push(record);
            }

            i += 1;
        }

        println!();
        if failed_cases.is_empty() {
            println!(
                "{}",
                console::style(format!("{suite}: all cases passed! 🎉"))
                    .bold()
                    .green()
            );
            return;
        }

        println!(
            "{}",
            console::style(format!("{suite}: summary of failed cases:"))
                .bold()
                .red()
        );
        for (idx, record) in failed_cases.iter().enumerate() {
            println!("\n{}. {} {} {}", idx + 1, record.name, record.method, record.url);
            if let CaseOutcome::Failed { reason, .. } = &record.outcome {
                for line in reason.lines() {
                    println!("   {line}");
                }
            }
        }
    }
}
