//! Page dependency graph construction.
//!
//! Links network requests and CPU tasks into a rooted DAG of causal
//! dependencies. Linking rules, in precedence order:
//!
//! 1. redirect legs chain to their source leg;
//! 2. a parser-initiated request depends on the document that parsed it;
//! 3. a script-initiated request depends on the earliest-starting earlier
//!    node for an initiator URL;
//! 4. CPU tasks depend on the network nodes whose responses enabled them,
//!    and requests issued inside a task depend on that task;
//! 5. anything still unlinked depends on the root.
//!
//! An edge whose insertion would create a cycle is dropped rather than
//! inserted.

use std::collections::HashMap;

use lantern_core::network::{Initiator, NetworkRequestRecord, ResourceType};
use lantern_core::{Error, Result};

use crate::node::{NodeId, PageGraph};
use crate::trace_processor::{CpuTask, ProcessedTrace};

/// Build the dependency graph for one page load.
///
/// Pure function of its inputs. Fails with `GraphConstruction` when no main
/// document request can be identified.
pub fn build_graph(trace: &ProcessedTrace, records: &[NetworkRequestRecord]) -> Result<PageGraph> {
    let mut usable: Vec<NetworkRequestRecord> = records
        .iter()
        .filter(|r| r.has_meaningful_timing())
        .cloned()
        .collect();
    usable.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then_with(|| a.request_id.cmp(&b.request_id))
    });

    let mut graph = PageGraph::new(usable.clone());
    let mut by_id: HashMap<String, NodeId> = HashMap::new();
    let mut by_url: HashMap<String, Vec<NodeId>> = HashMap::new();
    for (index, record) in usable.iter().enumerate() {
        let id = graph.add_network_node(index);
        by_id.insert(record.request_id.clone(), id);
        by_url.entry(record.url.clone()).or_default().push(id);
    }

    let root = find_root(&usable, &by_id)?;
    graph.set_root(root);

    link_network_nodes(&mut graph, &usable, root, &by_id, &by_url);
    link_cpu_nodes(&mut graph, trace, &by_id, &by_url);

    // Rule 5: nothing is left orphaned.
    let orphans: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.id != root && n.dependencies().is_empty())
        .map(|n| n.id)
        .collect();
    for orphan in orphans {
        graph.add_dependency(orphan, root);
    }

    Ok(graph)
}

/// The root is the head of the redirect chain of the earliest main-document
/// request. A main-frame navigation is one whose URL is its own document
/// URL; documents that fail that check (iframes) are only a fallback.
fn find_root(records: &[NetworkRequestRecord], by_id: &HashMap<String, NodeId>) -> Result<NodeId> {
    let document = records
        .iter()
        .find(|r| r.resource_type == ResourceType::Document && r.url == r.document_url)
        .or_else(|| {
            records
                .iter()
                .find(|r| r.resource_type == ResourceType::Document)
        })
        .ok_or_else(|| {
            Error::GraphConstruction("root node is not related to the main document".to_string())
        })?;

    let mut head = document;
    while let Some(source_id) = &head.redirect_source_id {
        match records.iter().find(|r| &r.request_id == source_id) {
            Some(source) => head = source,
            None => break,
        }
    }
    by_id.get(&head.request_id).copied().ok_or_else(|| {
        Error::GraphConstruction("root node is not related to the main document".to_string())
    })
}

fn link_network_nodes(
    graph: &mut PageGraph,
    records: &[NetworkRequestRecord],
    root: NodeId,
    by_id: &HashMap<String, NodeId>,
    by_url: &HashMap<String, Vec<NodeId>>,
) {
    for (index, record) in records.iter().enumerate() {
        let node = NodeId(index);
        if node == root {
            continue;
        }

        // Rule 1: redirect chain.
        if let Some(source_id) = &record.redirect_source_id {
            if let Some(&source) = by_id.get(source_id) {
                graph.add_dependency(node, source);
                continue;
            }
        }

        let initiator_urls: Vec<&str> = match &record.initiator {
            Initiator::Parser { url } => vec![url.as_str()],
            Initiator::Script { stack_urls } => stack_urls.iter().map(|u| u.as_str()).collect(),
            Initiator::Preload | Initiator::Other => Vec::new(),
        };

        // Rules 2 and 3: first resolvable initiator URL wins.
        for url in initiator_urls {
            if let Some(dependency) =
                earliest_node_for_url(graph, by_url, url, |r| r.start_time < record.start_time)
            {
                if dependency != node {
                    graph.add_dependency(node, dependency);
                    break;
                }
            }
        }
    }
}

/// The earliest-starting network node for `url` whose record passes
/// `predicate`. Ties collapse to the lowest node id (creation order).
fn earliest_node_for_url(
    graph: &PageGraph,
    by_url: &HashMap<String, Vec<NodeId>>,
    url: &str,
    predicate: impl Fn(&NetworkRequestRecord) -> bool,
) -> Option<NodeId> {
    let candidates = by_url.get(url)?;
    candidates
        .iter()
        .copied()
        .filter(|&id| graph.record(id).map(&predicate).unwrap_or(false))
        .min_by(|&a, &b| {
            let start_a = graph.record(a).map(|r| r.start_time).unwrap_or(f64::MAX);
            let start_b = graph.record(b).map(|r| r.start_time).unwrap_or(f64::MAX);
            start_a.total_cmp(&start_b).then(a.cmp(&b))
        })
}

fn link_cpu_nodes(
    graph: &mut PageGraph,
    trace: &ProcessedTrace,
    by_id: &HashMap<String, NodeId>,
    by_url: &HashMap<String, Vec<NodeId>>,
) {
    // Side table built up-front: timerId -> URLs attributable to the
    // installing event, so a TimerFire in a later task inherits them.
    let timer_urls = collect_timer_installs(&trace.tasks);

    for task in &trace.tasks {
        let cpu = graph.add_cpu_node(task.clone());

        // The task depends on the network responses that enabled it.
        let mut urls: Vec<String> = task.attributable_urls.clone();
        for event in &task.child_events {
            if event.name == "TimerFire" {
                if let Some(installed) = event.timer_id().and_then(|id| timer_urls.get(&id)) {
                    for url in installed {
                        if !urls.contains(url) {
                            urls.push(url.clone());
                        }
                    }
                }
            }
        }
        for url in &urls {
            let available = earliest_node_for_url(graph, by_url, url, |r| {
                r.end_time <= task.end_ms()
            });
            if let Some(network) = available {
                // Forgiving: skip the edge rather than create a back-edge.
                if !graph.depends_on(network, cpu) {
                    graph.add_dependency(cpu, network);
                }
            }
        }
    }

    // Second pass for rule 4's other direction, now that all CPU nodes
    // exist: a request sent during a task depends on that task.
    let cpu_ids: Vec<NodeId> = graph.nodes().filter(|n| n.is_cpu()).map(|n| n.id).collect();
    for cpu in cpu_ids {
        let request_nodes: Vec<NodeId> = graph
            .cpu_task(cpu)
            .map(|task| {
                task.child_events
                    .iter()
                    .filter(|e| e.name == "ResourceSendRequest")
                    .filter_map(|e| e.request_id())
                    .filter_map(|id| by_id.get(id).copied())
                    .collect()
            })
            .unwrap_or_default();
        for network in request_nodes {
            if !graph.depends_on(cpu, network) {
                graph.add_dependency(network, cpu);
            }
        }
    }
}

fn collect_timer_installs(tasks: &[CpuTask]) -> HashMap<u64, Vec<String>> {
    let mut installs: HashMap<u64, Vec<String>> = HashMap::new();
    for task in tasks {
        for event in &task.child_events {
            if event.name != "TimerInstall" {
                continue;
            }
            let Some(timer_id) = event.timer_id() else {
                continue;
            };
            let mut urls: Vec<String> = Vec::new();
            if let Some(url) = event.arg_url() {
                urls.push(url.to_string());
            }
            for url in event.stack_trace_urls() {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            if urls.is_empty() {
                urls = task.attributable_urls.clone();
            }
            installs.entry(timer_id).or_default().extend(urls);
        }
    }
    installs
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::network::RequestPriority;
    use lantern_core::trace::TraceEvent;
    use serde_json::json;

    fn make_record(
        id: &str,
        url: &str,
        start: f64,
        end: f64,
        resource_type: ResourceType,
        initiator: Initiator,
    ) -> NetworkRequestRecord {
        NetworkRequestRecord {
            request_id: id.to_string(),
            url: url.to_string(),
            document_url: "https://example.com/".to_string(),
            start_time: start,
            response_received_time: (start + end) / 2.0,
            end_time: end,
            transfer_size: 1000,
            resource_size: 1000,
            resource_type,
            status_code: 200,
            priority: RequestPriority::Medium,
            protocol: "http/1.1".to_string(),
            timing: None,
            initiator,
            redirect_source_id: None,
            redirect_destination_id: None,
            finished: true,
            failed: false,
            from_cache: false,
        }
    }

    fn make_child_event(name: &str, ts: u64, data: serde_json::Value) -> TraceEvent {
        serde_json::from_value(json!({
            "name": name,
            "ph": "I",
            "ts": ts,
            "pid": 1,
            "tid": 5,
            "args": {"data": data},
        }))
        .unwrap()
    }

    fn make_task(start_ms: u64, end_ms: u64, child_events: Vec<TraceEvent>, urls: Vec<&str>) -> CpuTask {
        CpuTask {
            id: format!("5.{}", start_ms * 1000),
            start_ts: start_ms * 1000,
            end_ts: end_ms * 1000,
            self_time_us: (end_ms - start_ms) * 1000,
            group: crate::trace_processor::TaskGroup::ScriptEvaluation,
            child_events,
            attributable_urls: urls.into_iter().map(|u| u.to_string()).collect(),
        }
    }

    fn empty_trace(tasks: Vec<CpuTask>) -> ProcessedTrace {
        ProcessedTrace {
            main_pid: 1,
            main_tid: 5,
            navigation_start_ts: 0,
            fcp_ts: None,
            fmp_ts: None,
            trace_end_ts: 60_000_000,
            tasks,
        }
    }

    fn url(n: u32) -> String {
        format!("https://example.com/{}", n)
    }

    #[test]
    fn test_end_to_end_dependency_ids() {
        let records = vec![
            make_record("1", &url(1), 0.0, 10.0, ResourceType::Document, Initiator::Other),
            make_record("2", &url(2), 5.0, 12.0, ResourceType::Script, Initiator::Other),
            make_record("3", &url(3), 5.0, 12.0, ResourceType::Script, Initiator::Other),
            make_record(
                "4",
                &url(4),
                10.0,
                20.0,
                ResourceType::Xhr,
                Initiator::Script {
                    stack_urls: vec![url(2)],
                },
            ),
        ];
        let graph = build_graph(&empty_trace(vec![]), &records).unwrap();

        let deps_of = |request_id: &str| -> Vec<String> {
            let node = graph
                .nodes()
                .find(|n| graph.record(n.id).map(|r| r.request_id == request_id).unwrap_or(false))
                .unwrap();
            let mut deps: Vec<String> = node
                .dependencies()
                .iter()
                .map(|&d| graph.record(d).unwrap().request_id.clone())
                .collect();
            deps.sort();
            deps
        };

        assert_eq!(deps_of("1"), Vec::<String>::new());
        assert_eq!(deps_of("2"), vec!["1"]);
        assert_eq!(deps_of("3"), vec!["1"]);
        assert_eq!(deps_of("4"), vec!["2"]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_duplicate_urls_depend_on_earliest_only() {
        let records = vec![
            make_record("1", &url(1), 0.0, 10.0, ResourceType::Document, Initiator::Other),
            make_record("2", &url(9), 5.0, 12.0, ResourceType::Script, Initiator::Other),
            make_record("3", &url(9), 7.0, 14.0, ResourceType::Script, Initiator::Other),
            make_record(
                "4",
                &url(4),
                20.0,
                25.0,
                ResourceType::Xhr,
                Initiator::Script {
                    stack_urls: vec![url(9)],
                },
            ),
        ];
        let graph = build_graph(&empty_trace(vec![]), &records).unwrap();

        let dependent = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "4").unwrap_or(false))
            .unwrap();
        assert_eq!(dependent.dependencies().len(), 1);
        let dep = graph.record(dependent.dependencies()[0]).unwrap();
        assert_eq!(dep.request_id, "2");
    }

    #[test]
    fn test_no_document_is_a_construction_error() {
        let records = vec![make_record(
            "1",
            &url(1),
            0.0,
            10.0,
            ResourceType::Script,
            Initiator::Other,
        )];
        let err = build_graph(&empty_trace(vec![]), &records).unwrap_err();
        assert_eq!(err.code(), "GRAPH_CONSTRUCTION");
        assert!(err.to_string().contains("main document"));
    }

    #[test]
    fn test_redirect_chain_roots_at_first_leg() {
        let mut first = make_record(
            "1:redirect",
            "http://example.com/",
            0.0,
            3.0,
            ResourceType::Document,
            Initiator::Other,
        );
        first.redirect_destination_id = Some("1".to_string());
        let mut second = make_record(
            "1",
            "https://example.com/",
            3.0,
            10.0,
            ResourceType::Document,
            Initiator::Other,
        );
        second.redirect_source_id = Some("1:redirect".to_string());

        let graph = build_graph(&empty_trace(vec![]), &[first, second]).unwrap();
        let root_record = graph.record(graph.root()).unwrap();
        assert_eq!(root_record.request_id, "1:redirect");

        let final_leg = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "1").unwrap_or(false))
            .unwrap();
        assert_eq!(final_leg.dependencies(), &[graph.root()]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_early_iframe_document_is_not_the_root() {
        // The iframe's document request starts first, but its URL is not the
        // document URL; the main-frame navigation wins.
        let iframe = make_record(
            "1",
            "https://ads.example.com/frame.html",
            0.0,
            8.0,
            ResourceType::Document,
            Initiator::Other,
        );
        let main = make_record(
            "2",
            "https://example.com/",
            5.0,
            15.0,
            ResourceType::Document,
            Initiator::Other,
        );
        let graph = build_graph(&empty_trace(vec![]), &[iframe, main]).unwrap();

        let root_record = graph.record(graph.root()).unwrap();
        assert_eq!(root_record.request_id, "2");
        let iframe_node = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "1").unwrap_or(false))
            .unwrap();
        assert_eq!(iframe_node.dependencies(), &[graph.root()]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_parser_initiator_depends_on_document() {
        let records = vec![
            make_record("1", &url(1), 0.0, 10.0, ResourceType::Document, Initiator::Other),
            make_record(
                "2",
                &url(2),
                12.0,
                20.0,
                ResourceType::Stylesheet,
                Initiator::Parser { url: url(1) },
            ),
        ];
        let graph = build_graph(&empty_trace(vec![]), &records).unwrap();
        let sheet = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "2").unwrap_or(false))
            .unwrap();
        assert_eq!(sheet.dependencies(), &[graph.root()]);
    }

    #[test]
    fn test_cpu_attribution_both_directions() {
        let task = make_task(
            15,
            30,
            vec![make_child_event("ResourceSendRequest", 16_000, json!({"requestId": "3"}))],
            vec![&url(2)],
        );
        let records = vec![
            make_record("1", &url(1), 0.0, 10.0, ResourceType::Document, Initiator::Other),
            make_record("2", &url(2), 5.0, 12.0, ResourceType::Script, Initiator::Other),
            make_record("3", &url(3), 16.0, 25.0, ResourceType::Xhr, Initiator::Other),
        ];
        let graph = build_graph(&empty_trace(vec![task]), &records).unwrap();

        let cpu = graph.nodes().find(|n| n.is_cpu()).unwrap();
        // Task depends on the script whose response enabled it.
        let script = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "2").unwrap_or(false))
            .unwrap();
        assert!(cpu.dependencies().contains(&script.id));
        // The XHR sent inside the task depends on the task.
        let xhr = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "3").unwrap_or(false))
            .unwrap();
        assert!(xhr.dependencies().contains(&cpu.id));
        graph.validate().unwrap();
    }

    #[test]
    fn test_timer_fire_inherits_install_attribution() {
        let installer = make_task(
            15,
            20,
            vec![make_child_event(
                "TimerInstall",
                16_000,
                json!({"timerId": 7, "url": url(2)}),
            )],
            vec![&url(2)],
        );
        let firer = make_task(
            40,
            45,
            vec![make_child_event("TimerFire", 40_000, json!({"timerId": 7}))],
            vec![],
        );
        let records = vec![
            make_record("1", &url(1), 0.0, 10.0, ResourceType::Document, Initiator::Other),
            make_record("2", &url(2), 5.0, 12.0, ResourceType::Script, Initiator::Other),
        ];
        let graph = build_graph(&empty_trace(vec![installer, firer]), &records).unwrap();

        let script = graph
            .nodes()
            .find(|n| graph.record(n.id).map(|r| r.request_id == "2").unwrap_or(false))
            .unwrap()
            .id;
        let firing_cpu = graph
            .nodes()
            .find(|n| graph.cpu_task(n.id).map(|t| t.start_ts == 40_000).unwrap_or(false))
            .unwrap();
        assert!(firing_cpu.dependencies().contains(&script));
    }
}
