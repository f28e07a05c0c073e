//! Host inspection used by the first-run advisory and the `sysinfo` command.

use std::fmt;

/// Whether the processor supports AVX, which the Roblox client effectively requires.
pub fn cpu_has_avx() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("avx")
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

pub struct Report {
    pub distro: String,
    pub cpu: String,
    pub avx: bool,
    pub kernel: String,
    pub wine: String,
    pub flatpak: bool,
}

impl Report {
    pub fn gather(wine_version: String) -> Self {
        let distro = std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|raw| os_release_name(&raw))
            .unwrap_or_else(|| "unknown".into());
        let cpu = std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|raw| cpu_model(&raw))
            .unwrap_or_else(|| "unknown".into());
        let kernel = std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".into());

        Self {
            distro,
            cpu,
            avx: cpu_has_avx(),
            kernel,
            wine: wine_version.trim().to_string(),
            flatpak: std::env::var_os("FLATPAK_ID").is_some(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## System information")?;
        writeln!(f, "* Distro: {}", self.distro)?;
        writeln!(f, "* Processor: {}", self.cpu)?;
        writeln!(f, "  * Supports AVX: {}", self.avx)?;
        writeln!(f, "* Kernel: {}", self.kernel)?;
        writeln!(f, "* Wine: {}", self.wine)?;
        if self.flatpak {
            writeln!(f, "* Flatpak: [x]")?;
        }
        Ok(())
    }
}

fn os_release_name(raw: &str) -> Option<String> {
    raw.lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim_matches('"').to_string())
}

fn cpu_model(raw: &str) -> Option<String> {
    raw.lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_os_release_and_cpuinfo() {
        let os = "NAME=\"Arch Linux\"\nPRETTY_NAME=\"Arch Linux\"\nID=arch\n";
        assert_eq!(os_release_name(os).as_deref(), Some("Arch Linux"));

        let cpu = "processor\t: 0\nvendor_id\t: AuthenticAMD\nmodel name\t: AMD Ryzen 7 5800X 8-Core Processor\n";
        assert_eq!(
            cpu_model(cpu).as_deref(),
            Some("AMD Ryzen 7 5800X 8-Core Processor")
        );
    }
}
