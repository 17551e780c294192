//! Offer installed kernelspecs as replacements for a kernel that failed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kernel_switch::{KernelConnection, KernelPicker};
use log::{info, warn};
use serde::Serialize;

/// An installed kernelspec the user can pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelspecChoice {
    pub name: String,
    pub display_name: String,
    pub language: String,
}

impl KernelspecChoice {
    pub fn to_connection(&self) -> KernelConnection {
        KernelConnection::local_kernelspec(&self.name, &self.display_name)
    }
}

/// List installed kernelspecs, sorted by name.
pub async fn list_kernelspec_choices() -> Vec<KernelspecChoice> {
    let specs = runtimelib::list_kernelspecs().await;
    let mut choices: Vec<KernelspecChoice> = specs
        .into_iter()
        .map(|s| KernelspecChoice {
            name: s.kernel_name,
            display_name: s.kernelspec.display_name,
            language: s.kernelspec.language,
        })
        .collect();
    choices.sort_by(|a, b| a.name.cmp(&b.name));
    // The same name can be installed in several Jupyter data dirs; the
    // first one found is what find_kernelspec resolves to.
    choices.dedup_by(|a, b| a.name == b.name);
    choices
}

/// Candidates to offer after `failing` did not start.
pub fn replacement_choices(
    choices: Vec<KernelspecChoice>,
    failing: &KernelConnection,
) -> Vec<KernelspecChoice> {
    choices
        .into_iter()
        .filter(|c| c.name != failing.kernelspec_name)
        .collect()
}

/// Chooses one of the offered kernelspecs by index, or `None` to decline.
///
/// Runs on a blocking thread, so it may wait on stdin or a dialog.
pub type ChooseFn = dyn Fn(&[KernelspecChoice], &KernelConnection) -> Option<usize> + Send + Sync;

enum Source {
    Installed,
    Fixed(Vec<KernelspecChoice>),
}

pub struct KernelspecPicker {
    source: Source,
    choose: Arc<ChooseFn>,
}

impl KernelspecPicker {
    /// Offer the kernelspecs installed on this machine.
    pub fn new(choose: Arc<ChooseFn>) -> Self {
        Self {
            source: Source::Installed,
            choose,
        }
    }

    /// Offer a fixed list of kernelspecs.
    pub fn with_choices(choices: Vec<KernelspecChoice>, choose: Arc<ChooseFn>) -> Self {
        Self {
            source: Source::Fixed(choices),
            choose,
        }
    }

    async fn available(&self) -> Vec<KernelspecChoice> {
        match &self.source {
            Source::Installed => list_kernelspec_choices().await,
            Source::Fixed(choices) => choices.clone(),
        }
    }
}

#[async_trait]
impl KernelPicker for KernelspecPicker {
    async fn ask_for_replacement(
        &self,
        resource: Option<&Path>,
        _current: Option<&KernelConnection>,
        failing: &KernelConnection,
    ) -> Option<KernelConnection> {
        let offered = replacement_choices(self.available().await, failing);
        if offered.is_empty() {
            warn!(
                "[picker] No kernelspecs other than {} are installed",
                failing.kernelspec_name
            );
            return None;
        }

        let choose = self.choose.clone();
        let failing = failing.clone();
        let picked = tokio::task::spawn_blocking(move || {
            let index = choose(&offered, &failing)?;
            offered.get(index).cloned()
        })
        .await;

        match picked {
            Ok(Some(choice)) => {
                info!(
                    "[picker] Picked {} for {}",
                    choice.name,
                    resource
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "untitled notebook".to_string())
                );
                Some(choice.to_connection())
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[picker] Kernel chooser failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn choice(name: &str, display_name: &str) -> KernelspecChoice {
        KernelspecChoice {
            name: name.to_string(),
            display_name: display_name.to_string(),
            language: "python".to_string(),
        }
    }

    fn installed() -> Vec<KernelspecChoice> {
        vec![
            choice("python3", "Python 3"),
            choice("conda-env", "Python (conda)"),
            choice("deno", "Deno"),
        ]
    }

    #[test]
    fn test_replacement_choices_excludes_failing_kernel() {
        let failing = KernelConnection::local_kernelspec("python3", "Python 3");
        let offered = replacement_choices(installed(), &failing);
        let names: Vec<&str> = offered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["conda-env", "deno"]);
    }

    #[test]
    fn test_choice_to_connection() {
        let conn = choice("deno", "Deno").to_connection();
        assert_eq!(conn.kernelspec_name, "deno");
        assert_eq!(conn.display_name, "Deno");
        assert!(conn.local_launch);
    }

    #[tokio::test]
    async fn test_picker_returns_chosen_kernel() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let seen_in_chooser = seen.clone();
        let picker = KernelspecPicker::with_choices(
            installed(),
            Arc::new(move |offered: &[KernelspecChoice], failing: &KernelConnection| {
                let mut seen = seen_in_chooser.lock().unwrap();
                seen.push(failing.kernelspec_name.clone());
                seen.extend(offered.iter().map(|c| c.name.clone()));
                offered.iter().position(|c| c.name == "deno")
            }),
        );
        let failing = KernelConnection::local_kernelspec("python3", "Python 3");

        let picked = picker
            .ask_for_replacement(None, None, &failing)
            .await
            .unwrap();

        assert_eq!(picked, KernelConnection::local_kernelspec("deno", "Deno"));
        assert_eq!(*seen.lock().unwrap(), vec!["python3", "conda-env", "deno"]);
    }

    #[tokio::test]
    async fn test_picker_decline() {
        let picker = KernelspecPicker::with_choices(
            installed(),
            Arc::new(|_: &[KernelspecChoice], _: &KernelConnection| None),
        );
        let failing = KernelConnection::local_kernelspec("python3", "Python 3");
        assert!(picker.ask_for_replacement(None, None, &failing).await.is_none());
    }

    #[tokio::test]
    async fn test_picker_out_of_range_index_declines() {
        let picker = KernelspecPicker::with_choices(
            installed(),
            Arc::new(|_: &[KernelspecChoice], _: &KernelConnection| Some(99)),
        );
        let failing = KernelConnection::local_kernelspec("python3", "Python 3");
        assert!(picker.ask_for_replacement(None, None, &failing).await.is_none());
    }

    #[tokio::test]
    async fn test_picker_without_alternatives_never_asks() {
        let asked = Arc::new(Mutex::new(false));
        let asked_in_chooser = asked.clone();
        let picker = KernelspecPicker::with_choices(
            vec![choice("python3", "Python 3")],
            Arc::new(move |_: &[KernelspecChoice], _: &KernelConnection| {
                *asked_in_chooser.lock().unwrap() = true;
                Some(0)
            }),
        );
        let failing = KernelConnection::local_kernelspec("python3", "Python 3");

        assert!(picker.ask_for_replacement(None, None, &failing).await.is_none());
        assert!(!*asked.lock().unwrap());
    }
}
