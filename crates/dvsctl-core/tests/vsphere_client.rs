//! vSphere collaborator against a mocked VI/JSON endpoint

use dvsctl_core::{
    CoreError, CreateSwitchParams, HostMember, HostMembershipParams, ManagedObjectRef, PollPolicy,
    PortGroupParams, VsphereClient, add_hosts_and_wait, add_port_group_and_wait,
    create_switch_and_wait, with_session, with_session_until,
};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/sdk/vim25/8.0.1.0";
const SESSION: &str = "5a1c9e3f-session";

fn moref(kind: &str, value: &str) -> Value {
    json!({"_typeName": "ManagedObjectReference", "type": kind, "value": value})
}

fn task_info(task: &str, state: &str, extra: Value) -> Value {
    let mut info = json!({
        "_typeName": "TaskInfo",
        "key": task,
        "task": moref("Task", task),
        "state": state,
        "cancelled": false,
        "cancelable": false
    });
    if let (Some(obj), Some(extra)) = (info.as_object_mut(), extra.as_object()) {
        obj.extend(extra.clone());
    }
    info
}

fn policy() -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(10)).with_timeout(Duration::from_secs(10))
}

fn client(server: &MockServer) -> VsphereClient {
    VsphereClient::builder()
        .base_url(format!("{}{}", server.uri(), ROOT))
        .username("administrator@vsphere.local")
        .password("secret")
        .build()
        .unwrap()
}

async fn mount_get(server: &MockServer, p: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("{}{}", ROOT, p)))
        .and(header("vmware-api-session-id", SESSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Service content, login, logout, datacenter and network folder
async fn mount_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}/ServiceInstance/ServiceInstance/content", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_typeName": "ServiceContent",
            "rootFolder": moref("Folder", "group-d1"),
            "sessionManager": moref("SessionManager", "SessionManager"),
            "searchIndex": moref("SearchIndex", "SearchIndex"),
            "about": {"fullName": "VMware vCenter Server 8.0.1", "apiVersion": "8.0.1.0"}
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/SessionManager/SessionManager/Login", ROOT)))
        .and(body_partial_json(json!({"userName": "administrator@vsphere.local"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("vmware-api-session-id", SESSION)
                .set_body_json(json!({"_typeName": "UserSession", "key": "52b5"})),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/SessionManager/SessionManager/Logout", ROOT)))
        .and(header("vmware-api-session-id", SESSION))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .named("logout")
        .mount(server)
        .await;

    mount_get(
        server,
        "/Folder/group-d1/childEntity",
        json!([moref("Datacenter", "datacenter-3")]),
    )
    .await;
    mount_get(
        server,
        "/Datacenter/datacenter-3/networkFolder",
        moref("Folder", "group-n5"),
    )
    .await;
}

/// `queued` on submit, `running` on the first refresh, then `last`
async fn mount_task(server: &MockServer, task: &str, last: Value) {
    let p = format!("{}/Task/{}/info", ROOT, task);
    Mock::given(method("GET"))
        .and(path(p.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_info(task, "queued", json!({}))))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(p.clone()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(task_info(task, "running", json!({"progress": 40}))),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_json(last))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_switch_end_to_end() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/Folder/group-n5/CreateDVS_Task", ROOT)))
        .and(header("vmware-api-session-id", SESSION))
        .and(body_partial_json(json!({
            "spec": {
                "_typeName": "DVSCreateSpec",
                "configSpec": {"_typeName": "DVSConfigSpec", "name": "dvs-01"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("Task", "task-101")))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(
        &server,
        "task-101",
        task_info(
            "task-101",
            "success",
            json!({"result": moref("VmwareDistributedVirtualSwitch", "dvs-42")}),
        ),
    )
    .await;

    let switch = with_session(&client(&server), |session| async move {
        create_switch_and_wait(&session, &CreateSwitchParams::new("dvs-01"), policy(), None).await
    })
    .await
    .unwrap();

    assert_eq!(
        switch,
        ManagedObjectRef::new("VmwareDistributedVirtualSwitch", "dvs-42")
    );
}

#[tokio::test]
async fn task_error_is_operation_failure_and_still_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/Folder/group-n5/CreateDVS_Task", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("Task", "task-7")))
        .mount(&server)
        .await;
    mount_task(
        &server,
        "task-7",
        task_info(
            "task-7",
            "error",
            json!({"error": {
                "_typeName": "LocalizedMethodFault",
                "fault": {"_typeName": "DuplicateName", "name": "dvs-01"},
                "localizedMessage": "The name 'dvs-01' already exists."
            }}),
        ),
    )
    .await;

    let err = with_session(&client(&server), |session| async move {
        create_switch_and_wait(&session, &CreateSwitchParams::new("dvs-01"), policy(), None).await
    })
    .await
    .unwrap_err();

    match err {
        CoreError::OperationFailed { message, detail } => {
            assert_eq!(message, "The name 'dvs-01' already exists. (DuplicateName)");
            assert_eq!(detail["fault"]["_typeName"], "DuplicateName");
        }
        other => panic!("expected OperationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn method_fault_on_submit_is_unexpected() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/Folder/group-n5/CreateDVS_Task", ROOT)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "_typeName": "NotAuthorized",
            "faultMessage": [{"_typeName": "LocalizableMessage", "key": "vim.fault.NoPermission", "message": "Permission to perform this operation was denied."}]
        })))
        .mount(&server)
        .await;

    let err = with_session(&client(&server), |session| async move {
        create_switch_and_wait(&session, &CreateSwitchParams::new("dvs-01"), policy(), None).await
    })
    .await
    .unwrap_err();

    match err {
        CoreError::UnexpectedFault {
            operation, message, ..
        } => {
            assert_eq!(operation, "CreateDVS_Task");
            assert!(message.contains("Permission to perform this operation was denied."));
        }
        other => panic!("expected UnexpectedFault, got {other:?}"),
    }
}

#[tokio::test]
async fn unreadable_task_info_names_the_operation() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/Folder/group-n5/CreateDVS_Task", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("Task", "task-13")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/Task/task-13/info", ROOT)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = with_session(&client(&server), |session| async move {
        create_switch_and_wait(&session, &CreateSwitchParams::new("dvs-01"), policy(), None).await
    })
    .await
    .unwrap_err();

    match err {
        CoreError::UnexpectedFault {
            operation,
            handle,
            message,
        } => {
            assert_eq!(operation, "create-switch");
            assert_eq!(handle, "task-13");
            assert!(message.starts_with("reading task info"), "{message}");
        }
        other => panic!("expected UnexpectedFault, got {other:?}"),
    }
}

#[tokio::test]
async fn add_port_group_uses_entity_as_result() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!(
            "{}/VmwareDistributedVirtualSwitch/dvs-42/AddDVPortgroup_Task",
            ROOT
        )))
        .and(body_partial_json(json!({
            "spec": [{"_typeName": "DVPortgroupConfigSpec", "name": "pg-web", "numPorts": 16, "type": "earlyBinding"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("Task", "task-8")))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(
        &server,
        "task-8",
        task_info(
            "task-8",
            "success",
            json!({"entity": moref("VmwareDistributedVirtualSwitch", "dvs-42")}),
        ),
    )
    .await;

    let params = PortGroupParams::new(
        ManagedObjectRef::new("VmwareDistributedVirtualSwitch", "dvs-42"),
        "pg-web",
    )
    .with_ports(16);
    with_session(&client(&server), |session| async move {
        add_port_group_and_wait(&session, &params, policy(), None).await
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn add_hosts_reconfigures_with_current_version() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    mount_get(
        &server,
        "/VmwareDistributedVirtualSwitch/dvs-42/config",
        json!({"_typeName": "VMwareDVSConfigInfo", "configVersion": "3", "name": "dvs-01"}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/SearchIndex/SearchIndex/FindByDnsName", ROOT)))
        .and(body_partial_json(json!({"dnsName": "esx01.lab.local", "vmSearch": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("HostSystem", "host-10")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!(
            "{}/VmwareDistributedVirtualSwitch/dvs-42/ReconfigureDvs_Task",
            ROOT
        )))
        .and(body_partial_json(json!({
            "spec": {
                "configVersion": "3",
                "host": [{
                    "operation": "add",
                    "host": {"type": "HostSystem", "value": "host-10"},
                    "backing": {"pnicSpec": [{"pnicDevice": "vmnic1"}]}
                }]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("Task", "task-9")))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(
        &server,
        "task-9",
        task_info(
            "task-9",
            "success",
            json!({"entity": moref("VmwareDistributedVirtualSwitch", "dvs-42")}),
        ),
    )
    .await;

    let params = HostMembershipParams::new(ManagedObjectRef::new(
        "VmwareDistributedVirtualSwitch",
        "dvs-42",
    ))
    .with_host(HostMember::new("esx01.lab.local").with_nic("vmnic1"));
    with_session(&client(&server), |session| async move {
        add_hosts_and_wait(&session, &params, policy(), None).await
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn unknown_host_is_rejected_before_submit() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/SearchIndex/SearchIndex/FindByIp", ROOT)))
        .and(body_partial_json(json!({"ip": "10.0.0.99"})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let params = CreateSwitchParams::new("dvs-01").with_host(HostMember::new("10.0.0.99"));
    let err = with_session(&client(&server), |session| async move {
        create_switch_and_wait(&session, &params, policy(), None).await
    })
    .await
    .unwrap_err();

    assert!(err.is_bad_request(), "got {err:?}");
    assert!(err.to_string().contains("10.0.0.99"));
}

#[tokio::test]
async fn find_switch_by_name() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    mount_get(
        &server,
        "/Folder/group-n5/childEntity",
        json!([
            moref("DistributedVirtualPortgroup", "dvportgroup-1"),
            moref("VmwareDistributedVirtualSwitch", "dvs-41"),
            moref("VmwareDistributedVirtualSwitch", "dvs-42")
        ]),
    )
    .await;
    mount_get(&server, "/VmwareDistributedVirtualSwitch/dvs-41/name", json!("dvs-old")).await;
    mount_get(&server, "/VmwareDistributedVirtualSwitch/dvs-42/name", json!("dvs-01")).await;

    let (found, missing) = with_session(&client(&server), |session| async move {
        let found = session.find_switch("dvs-01").await?;
        let missing = session.find_switch("nope").await?;
        Ok((found, missing))
    })
    .await
    .unwrap();

    assert_eq!(
        found,
        Some(ManagedObjectRef::new("VmwareDistributedVirtualSwitch", "dvs-42"))
    );
    assert_eq!(missing, None);
}

#[tokio::test]
async fn rejected_login_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/ServiceInstance/ServiceInstance/content", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rootFolder": moref("Folder", "group-d1"),
            "sessionManager": moref("SessionManager", "SessionManager")
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/SessionManager/SessionManager/Login", ROOT)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "_typeName": "InvalidLogin",
            "faultMessage": [{"message": "Cannot complete login due to an incorrect user name or password."}]
        })))
        .mount(&server)
        .await;

    let err = client(&server).login().await.unwrap_err();
    assert!(err.is_connection());
    assert!(err.to_string().contains("incorrect user name or password"));
}

#[tokio::test]
async fn login_without_session_header_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/ServiceInstance/ServiceInstance/content", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rootFolder": moref("Folder", "group-d1"),
            "sessionManager": moref("SessionManager", "SessionManager")
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/SessionManager/SessionManager/Login", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "x"})))
        .mount(&server)
        .await;

    let err = client(&server).login().await.unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn unreachable_endpoint_is_connection_error() {
    let client = VsphereClient::builder()
        .base_url(format!("http://127.0.0.1:1{}", ROOT))
        .username("root")
        .password("secret")
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let err = client.login().await.unwrap_err();
    assert!(err.is_connection(), "got {err:?}");
    assert!(err.is_retryable());
}

/// Content answers, login never does within the test
async fn mount_hung_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}/ServiceInstance/ServiceInstance/content", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rootFolder": moref("Folder", "group-d1"),
            "sessionManager": moref("SessionManager", "SessionManager")
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/SessionManager/SessionManager/Login", ROOT)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("vmware-api-session-id", SESSION)
                .set_delay(Duration::from_secs(30)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn cancellation_interrupts_a_hanging_login() {
    let server = MockServer::start().await;
    mount_hung_login(&server).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = with_session_until(&client(&server), &cancel, |_session| async move { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn unanswered_login_times_out_as_connection_error() {
    let server = MockServer::start().await;
    mount_hung_login(&server).await;

    let client = VsphereClient::builder()
        .base_url(format!("{}{}", server.uri(), ROOT))
        .username("root")
        .password("secret")
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let started = Instant::now();
    let err = client.login().await.unwrap_err();
    assert!(err.is_connection(), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancelled_work_still_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = with_session_until(&client(&server), &cancel, |_session| {
        std::future::pending::<dvsctl_core::Result<()>>()
    })
    .await
    .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    // logout expectation is verified when the server drops
}
