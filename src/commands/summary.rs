use chrono::Local;

use crate::config::TrackerConfig;
use crate::store::PollStore;
use crate::summary::calculate_averages;

pub fn run(store: &PollStore, config: &TrackerConfig, top: usize) {
    let today = Local::now().date_naive();
    let averages = calculate_averages(store.records(), config, today);
    if averages.is_empty() {
        println!("No polls on file");
        return;
    }

    println!("Weighted averages over {} polls ({}):", store.len(), today);
    for (rank, avg) in averages.iter().take(top).enumerate() {
        println!("{:>3}. {:<26} {:>5.1}%", rank + 1, avg.name, avg.average);
    }
}
