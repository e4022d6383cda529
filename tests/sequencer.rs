mod common;

use common::{FakeControlPlane, FakeHost, FakePrompt, FetchReply, JOIN_LINE, node_config};
use knode::error::ProvisionError;
use knode::services::node::{CONTAINERD_CONFIG_PATH, HOSTS_PATH, KUBERNETES_REPO_PATH};
use knode::utils::exec::PackageManager;
use knode::{RunReport, Sequencer, StepContext, StepResult};

fn run(host: &FakeHost, prompt: &FakePrompt, cp: &FakeControlPlane, from: usize) -> RunReport {
    let config = node_config();
    let mut ctx = StepContext {
        exec: host,
        prompt,
        control_plane: cp,
        config: &config,
        package_manager: PackageManager::Dnf,
        node_name: None,
    };
    Sequencer::starting_at(from).unwrap().run(&mut ctx)
}

fn fatal_step(report: &RunReport) -> Option<usize> {
    report.fatal().map(|r| r.number)
}

#[test]
fn full_run_joins_the_cluster() {
    let host = FakeHost::new("worker-1");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 1);

    assert!(report.is_success());
    assert_eq!(report.attempted(), (1..=9).collect::<Vec<_>>());
    assert!(host.ran("swapoff -a"));
    assert!(host.ran("sysctl --system"));
    assert!(host.ran("systemctl enable kubelet"));
    assert!(host.ran(JOIN_LINE));
    assert!(prompt.questions.borrow().is_empty());

    let shown = host.shown.borrow();
    assert_eq!(shown.len(), 1);
    assert!(shown[0].contains("--token abcdef.****************"));
    assert!(!shown[0].contains("0123456789abcdef"));

    let fstab = host.file("/etc/fstab").unwrap();
    assert!(fstab.contains("#/dev/mapper/rl-swap"));
    let containerd = host.file(CONTAINERD_CONFIG_PATH).unwrap();
    assert!(containerd.contains("SystemdCgroup = true"));
}

#[test]
fn second_run_leaves_files_unchanged() {
    let host = FakeHost::new("localhost");
    let prompt = FakePrompt::new(&["worker-1"]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    assert!(run(&host, &prompt, &cp, 1).is_success());
    let after_first = host.files.borrow().clone();

    assert!(run(&host, &prompt, &cp, 1).is_success());
    let after_second = host.files.borrow().clone();

    assert_eq!(after_first, after_second);
    let hosts = host.file(HOSTS_PATH).unwrap();
    assert_eq!(hosts.matches("10.0.0.10 k8s-master").count(), 1);
    // Only the first run saw a placeholder hostname
    assert_eq!(prompt.questions.borrow().len(), 1);
}

#[test]
fn existing_hosts_mapping_is_not_duplicated() {
    let host = FakeHost::new("worker-1");
    host.files.borrow_mut().insert(
        HOSTS_PATH.to_string(),
        "127.0.0.1 localhost\n10.0.0.10 k8s-master\n".to_string(),
    );
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    assert!(run(&host, &prompt, &cp, 8).is_success());
    assert_eq!(
        host.file(HOSTS_PATH).unwrap(),
        "127.0.0.1 localhost\n10.0.0.10 k8s-master\n"
    );
}

#[test]
fn inactive_container_runtime_stops_before_kubernetes_install() {
    let host = FakeHost::new("worker-1");
    *host.containerd_state.borrow_mut() = "failed".to_string();
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 1);

    assert_eq!(fatal_step(&report), Some(5));
    assert_eq!(report.attempted(), vec![1, 2, 3, 4, 5]);
    match &report.fatal().unwrap().result {
        StepResult::Fatal(ProvisionError::ServiceInactive { service, state }) => {
            assert_eq!(service, "containerd");
            assert_eq!(state, "failed");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!host.ran("dnf install -y kubelet"));
    assert!(!host.ran("systemctl enable kubelet"));
}

#[test]
fn no_join_command_from_anywhere_stops_before_join() {
    for reply in [FetchReply::Empty, FetchReply::Unreachable] {
        let host = FakeHost::new("worker-1");
        let prompt = FakePrompt::new(&[""]);
        let cp = FakeControlPlane::new(reply);

        let report = run(&host, &prompt, &cp, 1);

        assert_eq!(fatal_step(&report), Some(9));
        assert!(matches!(
            report.fatal().unwrap().result,
            StepResult::Fatal(ProvisionError::EmptyJoinCommand)
        ));
        assert_eq!(cp.fetches.get(), 1);
        assert_eq!(prompt.questions.borrow().len(), 1);
        assert!(!host.ran("kubeadm join"));
    }
}

#[test]
fn operator_join_command_used_when_remote_fails() {
    let host = FakeHost::new("worker-1");
    let prompt = FakePrompt::new(&[JOIN_LINE]);
    let cp = FakeControlPlane::new(FetchReply::Unreachable);

    let report = run(&host, &prompt, &cp, 9);

    assert!(report.is_success());
    assert!(host.ran(JOIN_LINE));
}

#[test]
fn malformed_operator_join_command_is_fatal() {
    let host = FakeHost::new("worker-1");
    let prompt = FakePrompt::new(&["kubeadm join 10.0.0.10:6443 --token abc.def; reboot"]);
    let cp = FakeControlPlane::new(FetchReply::Empty);

    let report = run(&host, &prompt, &cp, 9);

    assert!(matches!(
        report.fatal().unwrap().result,
        StepResult::Fatal(ProvisionError::InvalidJoinCommand(_))
    ));
    assert!(!host.ran("kubeadm"));
}

#[test]
fn placeholder_hostname_is_replaced_with_operator_value() {
    let host = FakeHost::new("localhost.localdomain");
    let prompt = FakePrompt::new(&["worker-7"]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 8);

    assert!(report.is_success());
    assert_eq!(*host.hostname.borrow(), "worker-7");
    assert!(host.ran("hostnamectl set-hostname worker-7"));
}

#[test]
fn empty_hostname_reply_keeps_current_name() {
    let host = FakeHost::new("localhost");
    let prompt = FakePrompt::new(&[""]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 8);

    assert!(report.is_success());
    assert_eq!(*host.hostname.borrow(), "localhost");
    assert!(!host.ran("hostnamectl"));
}

#[test]
fn invalid_hostname_reply_is_fatal() {
    let host = FakeHost::new("localhost");
    let prompt = FakePrompt::new(&["not a hostname"]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 8);

    assert_eq!(fatal_step(&report), Some(8));
    assert!(matches!(
        report.fatal().unwrap().result,
        StepResult::Fatal(ProvisionError::InvalidHostname(_))
    ));
    assert!(!host.ran("kubeadm"));
}

#[test]
fn repo_definition_embeds_configured_version() {
    let host = FakeHost::new("worker-1");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    run(&host, &prompt, &cp, 1);

    let repo = host.file(KUBERNETES_REPO_PATH).unwrap();
    assert!(repo.contains("baseurl=https://pkgs.k8s.io/core:/stable:/v1.29/rpm/"));
    assert!(repo.contains("gpgkey=https://pkgs.k8s.io/core:/stable:/v1.29/rpm/repodata/repomd.xml.key"));
}

#[test]
fn package_failure_halts_before_later_steps() {
    let cases = [
        ("dnf install -y yum-utils", 3),
        ("dnf install -y containerd.io", 5),
        ("dnf install -y kubelet", 6),
    ];

    for (failing, step) in cases {
        let host = FakeHost::new("worker-1");
        host.fail(failing, 1, "Error: Failed to download metadata");
        let prompt = FakePrompt::new(&[]);
        let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

        let report = run(&host, &prompt, &cp, 1);

        assert_eq!(fatal_step(&report), Some(step), "failing: {}", failing);
        assert_eq!(report.attempted(), (1..=step).collect::<Vec<_>>());
        assert!(
            host.commands.borrow().last().unwrap().starts_with(failing),
            "commands ran after {}",
            failing
        );
        match &report.fatal().unwrap().result {
            StepResult::Fatal(ProvisionError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, "1");
                assert!(stderr.contains("metadata"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!host.file(HOSTS_PATH).unwrap().contains("k8s-master"));
        assert_eq!(cp.fetches.get(), 0);
        if step == 3 {
            assert!(host.file(KUBERNETES_REPO_PATH).is_none());
        }
        if step <= 5 {
            assert!(host.file(CONTAINERD_CONFIG_PATH).is_none());
        }
    }
}

#[test]
fn firewall_failure_is_tolerated() {
    let host = FakeHost::new("worker-1");
    host.fail("systemctl disable --now firewalld", 1, "Unit firewalld.service not loaded.");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 1);

    assert!(report.is_success());
    assert!(matches!(report.records[0].result, StepResult::Success));
}

#[test]
fn swapoff_failure_is_fatal() {
    let host = FakeHost::new("worker-1");
    host.fail("swapoff", 255, "swapoff: /dev/dm-1: swapoff failed");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 1);

    assert_eq!(fatal_step(&report), Some(1));
    assert_eq!(host.file("/etc/fstab").unwrap(), common::FSTAB);
}

#[test]
fn sysctl_failure_is_fatal() {
    let host = FakeHost::new("worker-1");
    host.fail("sysctl --system", 1, "sysctl: cannot stat /proc/sys/net/bridge/bridge-nf-call-iptables");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 1);

    assert_eq!(fatal_step(&report), Some(2));
    assert_eq!(report.attempted(), vec![1, 2]);
    assert!(!host.ran("dnf"));
}

#[test]
fn join_failure_is_fatal() {
    let host = FakeHost::new("worker-1");
    host.fail("kubeadm join", 1, "");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 1);

    assert_eq!(fatal_step(&report), Some(9));
    match &report.fatal().unwrap().result {
        StepResult::Fatal(e) => {
            let message = e.to_string();
            assert!(message.contains("kubeadm join failed"), "{}", message);
            assert!(message.contains("exit code: 1"), "{}", message);
            assert!(!message.contains("0123456789abcdef"), "{}", message);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn registration_timeout_is_not_fatal() {
    let host = FakeHost::new("worker-1");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE)).not_ready_for(100);

    let report = run(&host, &prompt, &cp, 9);

    assert!(report.is_success());
}

#[test]
fn resume_skips_earlier_steps() {
    let host = FakeHost::new("worker-1");
    let prompt = FakePrompt::new(&[]);
    let cp = FakeControlPlane::new(FetchReply::Line(JOIN_LINE));

    let report = run(&host, &prompt, &cp, 7);

    assert_eq!(report.attempted(), vec![7, 8, 9]);
    assert!(!host.ran("swapoff"));
    assert!(!host.ran("dnf"));
    assert!(Sequencer::starting_at(0).is_err());
    assert!(Sequencer::starting_at(10).is_err());
}
