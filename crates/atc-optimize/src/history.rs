//! CSV export of evolution results.

use std::path::Path;

use crate::chromosome::Chromosome;
use crate::error::OptimizeResult;

/// Write the best-fitness-per-generation series to `path`.
pub fn export_history_csv(history: &[f64], path: &Path) -> OptimizeResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["generation", "best_fitness"])?;
    for (generation, fitness) in history.iter().enumerate() {
        writer.write_record([generation.to_string(), fitness.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a chromosome's timings to `path`, one row per light in gene order.
pub fn export_chromosome_csv(chromosome: &Chromosome, path: &Path) -> OptimizeResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["light", "green_time", "red_time"])?;
    for (index, gene) in chromosome.genes.iter().enumerate() {
        writer.write_record([
            index.to_string(),
            gene.green.to_string(),
            gene.red.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
