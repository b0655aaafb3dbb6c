//! NUMA node probing, memory binding, and CPU pinning.
//!
//! Frame memory is bound to a node with the raw `mbind(2)` syscall rather
//! than libnuma, and node/CPU topology is read from sysfs
//! (`/sys/devices/system/node`). Nodes above 63 are rejected so a single
//! word holds the node mask.

use crate::error::{Error, Result};
use std::io;
use std::path::Path;

/// Highest NUMA node id the single-word node mask can express.
const MAX_NODE: u32 = 63;

/// MPOL_BIND: strict allocation on the given nodes.
const MPOL_BIND: libc::c_int = 2;

/// Check whether a NUMA node is present on this system.
pub fn node_is_present(node: u32) -> bool {
    Path::new(&format!("/sys/devices/system/node/node{node}")).exists()
}

/// Validate that a NUMA node exists and is representable.
pub fn validate_node(node: u32) -> Result<()> {
    if node > MAX_NODE || !node_is_present(node) {
        return Err(Error::InvalidNumaNode(node));
    }
    Ok(())
}

/// Bind the pages of a mapped region to one NUMA node.
///
/// # Safety
///
/// `ptr` must be the start of a mapping of at least `len` bytes.
pub(crate) unsafe fn bind_region(ptr: *mut u8, len: usize, node: u32) -> Result<()> {
    validate_node(node)?;

    let nodemask: libc::c_ulong = 1 << node;
    // maxnode counts bits plus one; one word covers nodes 0..=63.
    let maxnode = (8 * std::mem::size_of::<libc::c_ulong>() + 1) as libc::c_ulong;

    let rc = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            ptr as *mut libc::c_void,
            len,
            MPOL_BIND,
            &nodemask as *const libc::c_ulong,
            maxnode,
            0u32,
        )
    };
    if rc != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// List the CPUs local to a NUMA node, from the node's sysfs `cpulist`.
pub fn cpus_for_node(node: u32) -> Result<Vec<usize>> {
    validate_node(node)?;
    let path = format!("/sys/devices/system/node/node{node}/cpulist");
    let text = std::fs::read_to_string(path)?;
    parse_cpu_list(&text)
}

/// Parse the Linux `cpulist` format (e.g. "0-7,16-23").
fn parse_cpu_list(s: &str) -> Result<Vec<usize>> {
    let bad = |part: &str| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed cpulist entry `{part}`"),
        ))
    };

    let mut out = Vec::new();
    for part in s.trim().split(',') {
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo.parse().map_err(|_| bad(part))?;
            let hi: usize = hi.parse().map_err(|_| bad(part))?;
            if hi < lo {
                return Err(bad(part));
            }
            out.extend(lo..=hi);
        } else {
            out.push(part.parse().map_err(|_| bad(part))?);
        }
    }
    Ok(out)
}

/// Pin the calling thread to the given set of CPUs.
pub fn pin_current_thread(cpus: &[usize]) -> Result<()> {
    if cpus.is_empty() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty CPU set",
        )));
    }

    let mut cpuset: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { libc::CPU_ZERO(&mut cpuset) };
    for &cpu in cpus {
        unsafe { libc::CPU_SET(cpu, &mut cpuset) };
    }

    let rc = unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset) };
    if rc != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_ranges() {
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
        assert_eq!(parse_cpu_list("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(
            parse_cpu_list("0-2,8,10-11\n").unwrap(),
            vec![0, 1, 2, 8, 10, 11]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cpu_list("five").is_err());
        assert!(parse_cpu_list("3-1").is_err());
    }

    #[test]
    fn test_node_zero_usually_present() {
        // Every Linux system exposes node0; don't fail on exotic ones.
        if Path::new("/sys/devices/system/node").exists() {
            assert!(node_is_present(0));
            assert!(validate_node(0).is_ok());
        }
    }

    #[test]
    fn test_absent_node_rejected() {
        assert!(matches!(
            validate_node(4095),
            Err(Error::InvalidNumaNode(4095))
        ));
    }

    #[test]
    fn test_pin_to_cpu_zero() {
        assert!(pin_current_thread(&[0]).is_ok());
        assert!(pin_current_thread(&[]).is_err());
    }
}
