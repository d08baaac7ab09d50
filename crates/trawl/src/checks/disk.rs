use anyhow::Result;
use trawl_common::{shell_call, FactTable, Unit};

/// Utilization percentage at which a filesystem is reported
pub const PERCENTAGE_ALERT: u32 = 98;

/// Reports mounted filesystems that are nearly full
#[derive(Default)]
pub struct DiskUsage;

impl Unit for DiskUsage {
    fn run(&mut self, _facts: &FactTable) -> Result<Option<String>> {
        let out = shell_call("df -P")?;
        Ok(evaluate(&out.stdout))
    }
}

fn evaluate(df: &str) -> Option<String> {
    let exceeded: Vec<String> = df
        .lines()
        .skip(1)
        .filter_map(|row| {
            let columns: Vec<&str> = row.split_whitespace().collect();
            let percentage: u32 = columns.get(4)?.trim_end_matches('%').parse().ok()?;
            (percentage >= PERCENTAGE_ALERT)
                .then(|| format!("partition={} at utilization={}%", columns[0], percentage))
        })
        .collect();

    if exceeded.is_empty() {
        return None;
    }
    Some(format!(
        "Disk utilization is at critical state (> {}). {}",
        PERCENTAGE_ALERT,
        exceeded.join(",")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF: &str = "\
Filesystem     1024-blocks      Used Available Capacity Mounted on
/dev/sda1         41152736  40740000    412736      99% /
tmpfs              8165112         0   8165112       0% /dev/shm
/dev/sdb1        961301832 942075796  19226036      98% /export
/dev/sdc1        961301832 932075796  29226036      97% /data
";

    #[test]
    fn test_full_partitions_reported() {
        assert_eq!(
            evaluate(DF).as_deref(),
            Some(
                "Disk utilization is at critical state (> 98). \
                 partition=/dev/sda1 at utilization=99%,partition=/dev/sdb1 at utilization=98%"
            )
        );
    }

    #[test]
    fn test_healthy_disks_quiet() {
        let healthy: String = DF.lines().take(1).chain(DF.lines().skip(2).take(1)).collect::<Vec<_>>().join("\n");
        assert_eq!(evaluate(&healthy), None);
        assert_eq!(evaluate(""), None);
    }
}
