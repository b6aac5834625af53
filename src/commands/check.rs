//! Check command implementation.
//!
//! Validates the configuration and reports the effective settings.

use perfdata_consolidator::config::{validate_effective_config, Config};
use perfdata_consolidator::transform::post_processors_from_config;

/// Validates configuration. Returns an error when any check fails.
pub fn command_check(config: &Config) -> anyhow::Result<()> {
    println!("🔍 perfdata-consolidator - Configuration Check");
    println!("==============================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n🔀 Consolidation settings...");
    let merge = &config.merge;
    println!("   Collision warnings per merge: {}", merge.max_collision_warnings);
    println!("   Unify process start times:    {}", merge.unify_process_start_times);
    println!("   Pool zero arrays:             {}", config.pool_zero_arrays);
    if merge.max_collision_warnings == 0 {
        println!("   ⚠️  Collision warnings are disabled; only a summary is logged");
    }

    println!("\n🧮 Post processors...");
    let processors = post_processors_from_config(&config.post_processing);
    if processors.is_empty() {
        println!("   ⚠️  No post processors enabled");
    } else {
        for processor in &processors {
            println!("   ✅ {}", processor.name());
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        anyhow::bail!("configuration check failed")
    }
}
