//! Privileged kernel-module loading
//!
//! This program is installed setuid-root and spawns the system module
//! loader on behalf of unprivileged callers, so the spawn path is
//! deliberately paranoid: the loader executable is resolved from a
//! kernel-owned config file and verified before use, the child receives
//! an explicit minimal environment instead of the caller's, and the
//! child's exit status is never trusted; the live module table is
//! re-queried as the only authoritative success signal.

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, warn};

use crate::error::{SetupError, SetupResult};
use crate::modules::{is_module_loaded, PROC_MODULES_PATH};
use crate::pci::{PciEnumerator, PciIdMatch, SysfsPciEnumerator};
use crate::platform::{is_embedded_soc, SOC_FAMILY_PATH};

/// Kernel config file naming the module-loader executable
pub const PROC_MODPROBE_PATH: &str = "/proc/sys/kernel/modprobe";
/// Fallback when the kernel does not name one
pub const DEFAULT_MODPROBE_PATH: &str = "/sbin/modprobe";
/// The only environment the child ever sees
const CHILD_PATH: &str = "/sbin";

/// Spawn-and-wait abstraction.
///
/// The real implementation forks and execs; tests substitute a mock that
/// records invocations and reports canned outcomes, keeping the load
/// decision procedure unit-testable.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner {
    /// Run `program` with `args` and exactly the environment `env`,
    /// stdio silenced, and wait for it to terminate. `Err` means the
    /// child could not be spawned or executed; the child's own exit
    /// status is not reported because callers must not trust it.
    fn run(&self, program: &Path, args: &[String], env: &[(String, String)])
        -> SetupResult<()>;
}

/// [`ProcessRunner`] backed by fork/exec/waitpid
#[derive(Debug, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
    ) -> SetupResult<()> {
        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        for (key, value) in env {
            command.env(key, value);
        }

        // A SIGCHLD disposition of "ignore" in the caller can make the
        // wait fail even though the child ran; that error is folded into
        // Ok because the module table gets the final word regardless.
        match command.status() {
            Ok(_) => Ok(()),
            Err(source) => {
                let raw = source.raw_os_error();
                if raw == Some(libc::ECHILD) {
                    return Ok(());
                }
                Err(SetupError::Spawn {
                    program: program.display().to_string(),
                    source,
                })
            }
        }
    }
}

/// Virtual-file locations consulted while loading; overridable so every
/// decision path tests against temporary files.
#[derive(Debug, Clone)]
pub struct LoaderPaths {
    /// Live module listing
    pub modules: PathBuf,
    /// Config file naming the loader executable
    pub modprobe_config: PathBuf,
    /// Fallback loader executable
    pub fallback_modprobe: PathBuf,
    /// SoC platform identity file
    pub soc_family: PathBuf,
}

impl Default for LoaderPaths {
    fn default() -> Self {
        Self {
            modules: PathBuf::from(PROC_MODULES_PATH),
            modprobe_config: PathBuf::from(PROC_MODPROBE_PATH),
            fallback_modprobe: PathBuf::from(DEFAULT_MODPROBE_PATH),
            soc_family: PathBuf::from(SOC_FAMILY_PATH),
        }
    }
}

/// Orchestrates one module-load attempt
pub struct ModuleLoader<R: ProcessRunner, P: PciEnumerator> {
    paths: LoaderPaths,
    runner: R,
    pci: P,
    /// Hardware filter gating the load, or `None` for ungated modules
    gate: Option<PciIdMatch>,
    /// Effective-uid source; injectable for the privilege-check tests
    effective_uid: fn() -> libc::uid_t,
}

impl ModuleLoader<SystemProcessRunner, SysfsPciEnumerator> {
    /// Loader wired to the real system: sysfs PCI enumeration, real
    /// fork/exec, production proc paths.
    pub fn system(gate: Option<PciIdMatch>) -> Self {
        Self::with_parts(
            LoaderPaths::default(),
            SystemProcessRunner,
            SysfsPciEnumerator::default(),
            gate,
            real_effective_uid,
        )
    }
}

impl<R: ProcessRunner, P: PciEnumerator> ModuleLoader<R, P> {
    /// Assemble a loader from explicit parts.
    pub fn with_parts(
        paths: LoaderPaths,
        runner: R,
        pci: P,
        gate: Option<PciIdMatch>,
        effective_uid: fn() -> libc::uid_t,
    ) -> Self {
        Self {
            paths,
            runner,
            pci,
            gate,
            effective_uid,
        }
    }

    /// Make sure `module` is loaded, spawning the module loader if
    /// necessary. Returns true when the module is loaded afterwards.
    ///
    /// `allow_embedded_bypass` lets the hardware gate pass on recognized
    /// embedded SoC platforms whose devices are not on the PCI bus.
    pub fn load(&self, print_errors: bool, module: &str, allow_embedded_bypass: bool) -> bool {
        if module.is_empty() {
            return false;
        }

        // Already loaded: nothing more to do.
        if is_module_loaded(&self.paths.modules, module) {
            return true;
        }

        if !self.gate_permits(print_errors, allow_embedded_bypass) {
            return false;
        }

        // Refuse privileged work if setuid did not actually take effect.
        if (self.effective_uid)() != 0 {
            return false;
        }

        let modprobe = self.resolve_modprobe_path();
        if !is_executable_file(&modprobe) {
            debug!("module loader {} failed verification", modprobe.display());
            return false;
        }

        let env = [("PATH".to_owned(), CHILD_PATH.to_owned())];
        match self.runner.run(&modprobe, &[module.to_owned()], &env) {
            Ok(()) => {}
            Err(err) => {
                if print_errors {
                    eprintln!("nvprobe: {err}.");
                }
            }
        }

        // The child's status is not trusted; the module table decides.
        is_module_loaded(&self.paths.modules, module)
    }

    /// Apply the hardware-presence gate. Only a successful enumeration
    /// reporting zero matching devices vetoes the load; an enumeration
    /// failure fails open.
    fn gate_permits(&self, print_errors: bool, allow_embedded_bypass: bool) -> bool {
        let Some(filter) = &self.gate else {
            return true;
        };

        match self.pci.count_matches(filter) {
            Ok(0) => {
                if allow_embedded_bypass && is_embedded_soc(&self.paths.soc_family) {
                    debug!("no matching PCI devices, proceeding on embedded SoC");
                    return true;
                }
                if print_errors {
                    eprintln!("nvprobe: no matching PCI devices found.");
                }
                false
            }
            Ok(count) => {
                debug!("{count} matching PCI devices present");
                true
            }
            Err(err) => {
                warn!("PCI enumeration failed ({err}); attempting the load anyway");
                true
            }
        }
    }

    /// Resolve the loader executable: the kernel-configured path up to
    /// its first newline, or the fixed fallback when empty or unreadable.
    fn resolve_modprobe_path(&self) -> PathBuf {
        let mut contents = String::new();
        let configured = fs::File::open(&self.paths.modprobe_config)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .is_ok();

        if configured {
            let first_line = contents.split('\n').next().unwrap_or("");
            if !first_line.is_empty() {
                return PathBuf::from(first_line);
            }
        }

        self.paths.fallback_modprobe.clone()
    }
}

fn real_effective_uid() -> libc::uid_t {
    unsafe { libc::geteuid() }
}

/// The resolved loader path is only trusted if it is a regular file with
/// the owner-execute bit set.
fn is_executable_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o100 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pci::MockPciEnumerator;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    const NVIDIA_GATE: PciIdMatch = PciIdMatch {
        vendor_id: Some(0x10de),
        device_id: None,
        subvendor_id: None,
        subdevice_id: None,
        device_class: 0x0300,
        device_class_mask: 0xff00,
    };

    fn root_uid() -> libc::uid_t {
        0
    }

    fn user_uid() -> libc::uid_t {
        1000
    }

    struct Fixture {
        dir: TempDir,
        paths: LoaderPaths,
    }

    /// Temp stand-ins for every proc/sys file the loader consults, plus
    /// a fake modprobe that passes executable verification.
    fn fixture(modules: &str) -> Fixture {
        let dir = tempdir().unwrap();
        let modules_path = dir.path().join("modules");
        fs::write(&modules_path, modules).unwrap();

        let modprobe = dir.path().join("modprobe");
        fs::write(&modprobe, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&modprobe, fs::Permissions::from_mode(0o755)).unwrap();

        let config = dir.path().join("modprobe-config");
        fs::write(&config, modprobe.to_str().unwrap()).unwrap();

        let paths = LoaderPaths {
            modules: modules_path,
            modprobe_config: config,
            fallback_modprobe: dir.path().join("missing-fallback"),
            soc_family: dir.path().join("family"),
        };

        Fixture { dir, paths }
    }

    fn no_pci_calls() -> MockPciEnumerator {
        let mut pci = MockPciEnumerator::new();
        pci.expect_count_matches().times(0);
        pci
    }

    fn no_runner_calls() -> MockProcessRunner {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(0);
        runner
    }

    #[test]
    fn empty_module_name_fails() {
        let fx = fixture("");
        let loader =
            ModuleLoader::with_parts(fx.paths, no_runner_calls(), no_pci_calls(), None, root_uid);
        assert!(!loader.load(false, "", false));
    }

    #[test]
    fn already_loaded_module_spawns_nothing() {
        let fx = fixture("nvidia 56696832 4 - Live 0x0000000000000000\n");
        let loader = ModuleLoader::with_parts(
            fx.paths,
            no_runner_calls(),
            no_pci_calls(),
            Some(NVIDIA_GATE),
            root_uid,
        );
        assert!(loader.load(false, "nvidia", false));
    }

    #[test]
    fn non_root_refuses_before_resolving_loader() {
        let mut fx = fixture("");
        // Point the config somewhere that would blow up if consulted.
        fx.paths.modprobe_config = PathBuf::from("/nonexistent/modprobe-config");
        fx.paths.fallback_modprobe = PathBuf::from("/nonexistent/modprobe");

        let loader = ModuleLoader::with_parts(
            fx.paths,
            no_runner_calls(),
            no_pci_calls(),
            None,
            user_uid,
        );
        assert!(!loader.load(false, "nvidia", false));
    }

    #[test]
    fn gate_vetoes_on_zero_matches() {
        let fx = fixture("");
        let mut pci = MockPciEnumerator::new();
        pci.expect_count_matches().returning(|_| Ok(0));

        let loader = ModuleLoader::with_parts(
            fx.paths,
            no_runner_calls(),
            pci,
            Some(NVIDIA_GATE),
            root_uid,
        );
        assert!(!loader.load(false, "nvidia", false));
    }

    #[test]
    fn embedded_bypass_overrides_zero_matches() {
        let fx = fixture("");
        fs::write(&fx.paths.soc_family, b"Tegra\n").unwrap();

        let mut pci = MockPciEnumerator::new();
        pci.expect_count_matches().returning(|_| Ok(0));

        let modules_path = fx.paths.modules.clone();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(move |_, args, _| {
            assert_eq!(args, ["nvidia-modeset"]);
            // Pretend the loader worked: publish the module.
            fs::write(&modules_path, "nvidia_modeset 1310720 2 - Live\n").unwrap();
            Ok(())
        });

        let loader =
            ModuleLoader::with_parts(fx.paths, runner, pci, Some(NVIDIA_GATE), root_uid);
        assert!(loader.load(false, "nvidia-modeset", true));
    }

    #[test]
    fn bypass_needs_embedded_platform() {
        let fx = fixture("");
        fs::write(&fx.paths.soc_family, b"jep106:036b\n").unwrap();

        let mut pci = MockPciEnumerator::new();
        pci.expect_count_matches().returning(|_| Ok(0));

        let loader = ModuleLoader::with_parts(
            fx.paths,
            no_runner_calls(),
            pci,
            Some(NVIDIA_GATE),
            root_uid,
        );
        assert!(!loader.load(false, "nvidia-modeset", true));
    }

    #[test]
    fn gate_fails_open_on_enumeration_error() {
        let fx = fixture("");
        let mut pci = MockPciEnumerator::new();
        pci.expect_count_matches().returning(|_| {
            Err(SetupError::PciEnumeration(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no sysfs",
            )))
        });

        let modules_path = fx.paths.modules.clone();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(move |_, _, _| {
            fs::write(&modules_path, "nvidia 4096 0 - Live\n").unwrap();
            Ok(())
        });

        let loader =
            ModuleLoader::with_parts(fx.paths, runner, pci, Some(NVIDIA_GATE), root_uid);
        assert!(loader.load(false, "nvidia", false));
    }

    #[test]
    fn child_gets_minimal_environment() {
        let fx = fixture("");
        let modules_path = fx.paths.modules.clone();

        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(move |_, _, env| {
            assert_eq!(env, [("PATH".to_owned(), "/sbin".to_owned())]);
            fs::write(&modules_path, "msr 4096 0 - Live\n").unwrap();
            Ok(())
        });

        let loader = ModuleLoader::with_parts(fx.paths, runner, no_pci_calls(), None, root_uid);
        assert!(loader.load(false, "msr", false));
    }

    #[test]
    fn module_table_decides_over_runner_result() {
        // Runner reports success but the module never appears: failure.
        let fx = fixture("");
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(|_, _, _| Ok(()));

        let loader = ModuleLoader::with_parts(fx.paths, runner, no_pci_calls(), None, root_uid);
        assert!(!loader.load(false, "nvidia", false));
    }

    #[test]
    fn spawn_failure_is_not_fatal_when_module_appears() {
        let fx = fixture("");
        let modules_path = fx.paths.modules.clone();

        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(1).returning(move |program, _, _| {
            // Another racing invocation loaded it in the meantime.
            fs::write(&modules_path, "nvidia 4096 0 - Live\n").unwrap();
            Err(SetupError::Spawn {
                program: program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            })
        });

        let loader = ModuleLoader::with_parts(fx.paths, runner, no_pci_calls(), None, root_uid);
        assert!(loader.load(false, "nvidia", false));
    }

    #[test]
    fn configured_loader_path_strips_newline() {
        let fx = fixture("");
        let loader = ModuleLoader::with_parts(
            LoaderPaths {
                modprobe_config: {
                    let path = fx.dir.path().join("config-nl");
                    fs::write(&path, "/sbin/kmod-shim\nsecond line ignored\n").unwrap();
                    path
                },
                ..fx.paths.clone()
            },
            no_runner_calls(),
            no_pci_calls(),
            None,
            root_uid,
        );
        assert_eq!(
            loader.resolve_modprobe_path(),
            PathBuf::from("/sbin/kmod-shim")
        );
    }

    #[test]
    fn empty_config_falls_back() {
        let fx = fixture("");
        let loader = ModuleLoader::with_parts(
            LoaderPaths {
                modprobe_config: {
                    let path = fx.dir.path().join("config-empty");
                    fs::write(&path, "\n").unwrap();
                    path
                },
                fallback_modprobe: PathBuf::from("/sbin/modprobe"),
                ..fx.paths.clone()
            },
            no_runner_calls(),
            no_pci_calls(),
            None,
            root_uid,
        );
        assert_eq!(
            loader.resolve_modprobe_path(),
            PathBuf::from("/sbin/modprobe")
        );
    }

    #[test]
    fn unverifiable_loader_is_never_executed() {
        let fx = fixture("");
        // Config points at a path that does not exist.
        fs::write(&fx.paths.modprobe_config, "/nonexistent/modprobe\n").unwrap();

        let loader = ModuleLoader::with_parts(
            fx.paths,
            no_runner_calls(),
            no_pci_calls(),
            None,
            root_uid,
        );
        assert!(!loader.load(false, "nvidia", false));
    }

    #[test]
    fn non_executable_loader_is_rejected() {
        let fx = fixture("");
        let plain = fx.dir.path().join("not-executable");
        fs::write(&plain, b"").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
        fs::write(&fx.paths.modprobe_config, plain.to_str().unwrap()).unwrap();

        let loader = ModuleLoader::with_parts(
            fx.paths,
            no_runner_calls(),
            no_pci_calls(),
            None,
            root_uid,
        );
        assert!(!loader.load(false, "nvidia", false));
    }
}
