//! Service exposing the stager ports and the analysis ports

use exposer_common::kube_utils::HasApiResource;
use exposer_common::labels::{workload_name, WorkloadLabels};
use exposer_common::Job;

use crate::k8s::{
    Deployment, ObjectMeta, Service, ServicePort, ServiceSpec, TargetPort, PROTOCOL_TCP,
};
use crate::layout::{
    ANALYSIS_CONTAINER_NAME, INPUT_STAGER_PORT, INPUT_STAGER_PORT_NAME, OUTPUT_STAGER_PORT,
    OUTPUT_STAGER_PORT_NAME,
};

fn named_port(name: &str, port: u16, protocol: Option<String>) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(TargetPort::Name(name.to_string())),
        protocol,
    }
}

/// Build the Service for a job
///
/// Analysis ports are copied from the analysis container of `deployment`,
/// so the Service always matches what the pod actually exposes.
pub fn build_service(
    job: &Job,
    namespace: &str,
    labels: &WorkloadLabels,
    deployment: &Deployment,
) -> Service {
    let mut ports = vec![
        named_port(
            OUTPUT_STAGER_PORT_NAME,
            OUTPUT_STAGER_PORT,
            Some(PROTOCOL_TCP.to_string()),
        ),
        named_port(
            INPUT_STAGER_PORT_NAME,
            INPUT_STAGER_PORT,
            Some(PROTOCOL_TCP.to_string()),
        ),
    ];

    if let Some(analysis) = deployment.container(ANALYSIS_CONTAINER_NAME) {
        // Container ports built here are always named.
        ports.extend(analysis.ports.iter().filter_map(|p| {
            p.name
                .as_deref()
                .map(|name| named_port(name, p.container_port, p.protocol.clone()))
        }));
    }

    Service {
        api_version: Service::API_VERSION.to_string(),
        kind: Service::KIND.to_string(),
        metadata: ObjectMeta::new(workload_name(job), namespace).with_labels(labels.to_map()),
        spec: ServiceSpec {
            selector: labels.selector(),
            ports,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::StagerImage;
    use crate::deployment::build_deployment;
    use crate::k8s::ContainerPort;
    use exposer_common::job::{ContainerDescriptor, ContainerImage, PortDescriptor, Step, StepComponent};

    fn job(ports: &[u16]) -> Job {
        Job {
            invocation_id: "abc".to_string(),
            steps: vec![Step {
                component: StepComponent {
                    name: "tool".to_string(),
                    container: ContainerDescriptor {
                        image: ContainerImage {
                            name: "discoenv/jupyterlab".to_string(),
                            tag: "beta".to_string(),
                        },
                        ports: ports
                            .iter()
                            .map(|p| PortDescriptor {
                                container_port: *p,
                                ..Default::default()
                            })
                            .collect(),
                        ..Default::default()
                    },
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn compile(j: &Job) -> (Deployment, Service) {
        let labels = WorkloadLabels::for_job(j);
        let d = build_deployment(j, "vice-apps", &labels, &StagerImage::default()).unwrap();
        let s = build_service(j, "vice-apps", &labels, &d);
        (d, s)
    }

    #[test]
    fn stager_ports_come_first() {
        let (_, svc) = compile(&job(&[]));
        let names: Vec<&str> = svc
            .spec
            .ports
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect();
        assert_eq!(names, vec!["tcp-output", "tcp-input"]);
        assert_eq!(svc.spec.ports[0].port, 60000);
        assert_eq!(svc.spec.ports[1].port, 60001);
    }

    #[test]
    fn one_port_per_analysis_port_targeted_by_name() {
        let (_, svc) = compile(&job(&[8888, 8080, 3000]));
        assert_eq!(svc.spec.ports.len(), 2 + 3);
        for (i, port) in svc.spec.ports[2..].iter().enumerate() {
            let name = format!("tcp-a-{i}");
            assert_eq!(port.name.as_deref(), Some(name.as_str()));
            assert_eq!(port.target_port, Some(TargetPort::Name(name)));
            assert_eq!(port.protocol.as_deref(), Some("TCP"));
        }
        assert_eq!(svc.spec.ports[2].port, 8888);
    }

    #[test]
    fn ports_mirror_the_built_deployment() {
        let j = job(&[8888]);
        let labels = WorkloadLabels::for_job(&j);
        let mut d = build_deployment(&j, "vice-apps", &labels, &StagerImage::default()).unwrap();
        for c in d.spec.template.spec.containers.iter_mut() {
            if c.name == ANALYSIS_CONTAINER_NAME {
                c.ports.push(ContainerPort::tcp("tcp-a-extra", 7777));
            }
        }

        let svc = build_service(&j, "vice-apps", &labels, &d);
        assert_eq!(svc.spec.ports.len(), 4);
        assert_eq!(svc.spec.ports[3].port, 7777);
    }

    #[test]
    fn selects_on_app_label() {
        let (_, svc) = compile(&job(&[]));
        assert_eq!(svc.metadata.name, "abc");
        assert_eq!(svc.spec.selector.len(), 1);
        assert_eq!(svc.spec.selector.get("app").map(String::as_str), Some("abc"));
    }
}
