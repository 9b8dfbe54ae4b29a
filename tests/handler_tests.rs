//! Handler notification tests
//!
//! 1. Deduplication - a handler notified several times runs once
//! 2. Ordering - handlers run in definition order, after all tasks
//! 3. Listen topics and chained notifications
//! 4. Handlers are not run for a host that failed or became unreachable
//! 5. Unchanged tasks do not notify

mod common;

use converge::connection::CommandResult;
use converge::report::{HostState, TaskStatus};
use pretty_assertions::assert_eq;

use common::*;

const ONE_HOST: &str = "[web]\nweb1\n";

fn handler_names(report: &converge::report::RunReport, host: &str) -> Vec<String> {
    report
        .plays
        .iter()
        .flat_map(|p| p.host_results(host))
        .filter(|r| r.handler)
        .map(|r| r.task.clone())
        .collect()
}

#[tokio::test]
async fn test_handler_runs_once_for_many_notifications() {
    let factory = MockConnectionFactory::new();
    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: site a
      copy: { dest: /etc/nginx/a.conf, content: "a" }
      notify: reload nginx
    - name: site b
      copy: { dest: /etc/nginx/b.conf, content: "b" }
      notify: reload nginx
    - name: site c
      copy: { dest: /etc/nginx/c.conf, content: "c" }
      notify: reload nginx
  handlers:
    - name: reload nginx
      command: nginx -s reload
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(handler_names(&report, "web1"), vec!["reload nginx"]);
    assert_eq!(factory.connection("web1").command_count("nginx -s reload"), 1);
    // the handler result comes after every task result
    let last = report.plays[0].host_results("web1").last().unwrap();
    assert!(last.handler);
    assert_eq!(last.status, TaskStatus::Changed);
}

#[tokio::test]
async fn test_handlers_run_in_definition_order() {
    let factory = MockConnectionFactory::new();
    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: change
      copy: { dest: /srv/app.conf, content: "v2" }
      notify: [second, first]
  handlers:
    - name: first
      command: echo first
    - name: second
      command: echo second
"#,
    );

    let callback = RecordingCallback::new();
    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .with_callback(callback.clone())
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(handler_names(&report, "web1"), vec!["first", "second"]);
    assert!(callback.host_events("web1").contains(&Event::HandlersStart {
        host: "web1".to_string(),
        handlers: vec!["first".to_string(), "second".to_string()],
    }));
}

#[tokio::test]
async fn test_listen_topic_reaches_every_listener() {
    let factory = MockConnectionFactory::new();
    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: certificate
      copy: { dest: /etc/ssl/site.pem, content: "cert" }
      notify: tls rotated
  handlers:
    - name: reload nginx
      command: nginx -s reload
      listen: tls rotated
    - name: reload haproxy
      command: systemctl reload haproxy
      listen: [tls rotated, lb changed]
    - name: unrelated
      command: "true"
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(
        handler_names(&report, "web1"),
        vec!["reload nginx", "reload haproxy"]
    );
}

#[tokio::test]
async fn test_handler_can_notify_another_handler() {
    let factory = MockConnectionFactory::new();
    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: upstream list
      copy: { dest: /etc/nginx/upstreams, content: "10.0.0.1" }
      notify: rebuild config
  handlers:
    - name: reload nginx
      command: nginx -s reload
    - name: rebuild config
      command: nginx-rebuild
      notify: reload nginx
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(
        handler_names(&report, "web1"),
        vec!["rebuild config", "reload nginx"]
    );
}

#[tokio::test]
async fn test_ok_task_does_not_notify() {
    let factory = MockConnectionFactory::new();
    factory.connection("web1").add_file("/etc/motd", "welcome\n");

    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: motd
      copy: { dest: /etc/motd, content: "welcome\n" }
      notify: announce
  handlers:
    - name: announce
      command: wall motd
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(statuses(&report, "web1"), vec![TaskStatus::Ok]);
    assert!(handler_names(&report, "web1").is_empty());
    assert_eq!(factory.connection("web1").command_count("wall motd"), 0);
}

#[tokio::test]
async fn test_failed_host_skips_pending_handlers() {
    let factory = MockConnectionFactory::new();
    factory.connection("web1").set_command_result(
        "migrate",
        CommandResult::failure(1, String::new(), "locked".to_string()),
    );

    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: config
      copy: { dest: /srv/app.conf, content: "x" }
      notify: restart app
    - name: migrate
      command: migrate
  handlers:
    - name: restart app
      command: systemctl restart app
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(report.plays[0].host_states["web1"], HostState::Failed);
    assert!(handler_names(&report, "web1").is_empty());
    assert_eq!(
        factory.connection("web1").command_count("systemctl restart app"),
        0
    );
}

#[tokio::test]
async fn test_failing_handler_fails_host() {
    let factory = MockConnectionFactory::new();
    factory.connection("web1").set_command_result(
        "systemctl restart app",
        CommandResult::failure(3, String::new(), "unit not found".to_string()),
    );

    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: config
      copy: { dest: /srv/app.conf, content: "x" }
      notify: restart app
  handlers:
    - name: restart app
      command: systemctl restart app
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(report.plays[0].host_states["web1"], HostState::Failed);
    assert_eq!(report.stats()["web1"].failed, 1);
    assert_eq!(report.exit_status().code(), 2);
}

#[tokio::test]
async fn test_unreachable_handler_marks_remaining_handlers() {
    let factory = MockConnectionFactory::new();
    // the deploy command goes through, the first handler finds the link gone
    factory.connection("web1").drop_after(1);

    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: deploy
      command: deploy
      notify: [restart app, flush cache]
  handlers:
    - name: restart app
      command: systemctl restart app
    - name: flush cache
      command: flush-cache
"#,
    );

    let report = executor(inventory(ONE_HOST), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(report.plays[0].host_states["web1"], HostState::Unreachable);
    assert_eq!(
        handler_names(&report, "web1"),
        vec!["restart app", "flush cache"]
    );
    assert_eq!(
        statuses(&report, "web1"),
        vec![
            TaskStatus::Changed,
            TaskStatus::Unreachable,
            TaskStatus::Unreachable
        ]
    );
    assert_eq!(factory.connection("web1").command_count("flush-cache"), 0);
    assert_eq!(report.exit_status().code(), 3);
}

#[tokio::test]
async fn test_handlers_are_per_host() {
    let factory = MockConnectionFactory::new();
    factory.connection("web2").add_file("/srv/app.conf", "x");

    let pb = playbook(
        r#"
- hosts: web
  tasks:
    - name: config
      copy: { dest: /srv/app.conf, content: "x" }
      notify: restart app
  handlers:
    - name: restart app
      command: systemctl restart app
"#,
    );

    let report = executor(inventory("[web]\nweb1\nweb2\n"), fast_config(), &factory)
        .run(&pb)
        .await
        .unwrap();

    assert_eq!(handler_names(&report, "web1"), vec!["restart app"]);
    assert!(handler_names(&report, "web2").is_empty());
}

#[test]
fn test_notify_unknown_handler_rejected_at_parse() {
    let err = converge::playbook::Playbook::parse(
        r#"
- hosts: web
  tasks:
    - name: config
      copy: { dest: /srv/app.conf, content: "x" }
      notify: nobody listens
"#,
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("nobody listens"));
}
