//! Shared test fixture: a small threat-intelligence dataset covering
//! markings, domain objects, internal objects and relations, indexed
//! through the engine itself.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stixdex::schema::{self, standard_id};
use stixdex::{AuthContext, Engine, EngineConfig, Principal};
use stixdex_store::{
    Document, DocumentStore, Hit, MemoryStore, Predicate, SearchRequest, SearchResponse,
};

pub const MALWARE_PARADISE: &str = "malware-paradise";
pub const MALWARE_MAZE: &str = "malware-maze";
pub const ATTACK_PATTERN_PHISHING: &str = "attack-pattern-1";
pub const ATTACK_PATTERN_SCHTASK: &str = "attack-pattern-2";
pub const INDICATOR_HASH: &str = "indicator-1";
pub const INDICATOR_URL: &str = "indicator-2";
pub const INDICATOR_REGISTRY: &str = "indicator-3";
pub const INTRUSION_SET_APT41: &str = "intrusion-set-apt41";
pub const CAMPAIGN_SHADOW: &str = "campaign-shadow";
pub const REPORT_QUARTERLY: &str = "report-quarterly";
pub const MARKING_TLP_CLEAR: &str = "marking-tlp-clear";
pub const MARKING_TLP_RED: &str = "marking-tlp-red";
pub const LEGACY_PARADISE_ID: &str = "malware--legacy-paradise";
pub const REL_USES_PARADISE: &str = "rel-uses-1";
pub const REL_INDICATES_PARADISE: &str = "rel-indicates-1";

/// Entity documents visible through the entities read pattern.
pub const ENTITY_COUNT: u64 = 29;
/// Relation documents visible through the relationships read pattern.
pub const RELATION_COUNT: u64 = 5;
/// Marking definitions (the only documents carrying a color).
pub const MARKING_COUNT: u64 = 11;

/// Store wrapper counting backend round-trips.
pub struct CountingStore {
    inner: MemoryStore,
    pub searches: AtomicUsize,
    pub mgets: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self { inner: MemoryStore::new(), searches: AtomicUsize::new(0), mgets: AtomicUsize::new(0) }
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn mget_calls(&self) -> usize {
        self.mgets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn create_index(&self, index: &str) -> stixdex_store::Result<()> {
        self.inner.create_index(index).await
    }

    async fn delete_index(&self, index: &str) -> stixdex_store::Result<()> {
        self.inner.delete_index(index).await
    }

    async fn index_exists(&self, index: &str) -> stixdex_store::Result<bool> {
        self.inner.index_exists(index).await
    }

    async fn list_indices(&self) -> stixdex_store::Result<Vec<String>> {
        self.inner.list_indices().await
    }

    async fn index(&self, index: &str, docs: Vec<Document>) -> stixdex_store::Result<()> {
        self.inner.index(index, docs).await
    }

    async fn get(&self, indices: &[String], id: &str) -> stixdex_store::Result<Option<Hit>> {
        self.inner.get(indices, id).await
    }

    async fn mget(&self, indices: &[String], ids: &[String]) -> stixdex_store::Result<Vec<Hit>> {
        self.mgets.fetch_add(1, Ordering::SeqCst);
        self.inner.mget(indices, ids).await
    }

    async fn search(
        &self,
        indices: &[String],
        request: SearchRequest,
    ) -> stixdex_store::Result<SearchResponse> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(indices, request).await
    }

    async fn count(&self, indices: &[String], predicate: &Predicate) -> stixdex_store::Result<u64> {
        self.inner.count(indices, predicate).await
    }

    async fn delete(&self, index: &str, ids: &[String]) -> stixdex_store::Result<()> {
        self.inner.delete(index, ids).await
    }
}

pub struct TestHarness {
    pub engine: Engine,
    pub ctx: AuthContext,
    pub admin: Principal,
    pub store: Arc<CountingStore>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A restricted analyst cleared for TLP:CLEAR only.
pub fn white_user() -> Principal {
    Principal::restricted("analyst-white", vec![MARKING_TLP_CLEAR.to_string()])
}

fn entity(id: &str, entity_type: &str, parents: serde_json::Value) -> Document {
    Document::new(id)
        .with("standard_id", standard_id(entity_type, &[("id", id)]))
        .with("entity_type", entity_type)
        .with("base_type", schema::BASE_TYPE_ENTITY)
        .with("parent_types", parents)
}

fn domain_object(id: &str, entity_type: &str, name: &str, created: &str) -> Document {
    entity(
        id,
        entity_type,
        json!(["Basic-Object", "Stix-Object", "Stix-Core-Object", "Stix-Domain-Object"]),
    )
    .with("name", name)
    .with("created", created)
    .with("created_at", created)
    .with("updated_at", created)
}

fn marking(id: &str, definition: &str, color: &str, created: &str) -> Document {
    entity(id, "Marking-Definition", json!(["Basic-Object", "Stix-Object", "Stix-Meta-Object"]))
        .with("definition", definition)
        .with("definition_type", definition.split(':').next().unwrap_or(definition))
        .with("x_stixdex_color", color)
        .with("created", created)
        .with("created_at", created)
}

fn internal_object(id: &str, entity_type: &str, created_at: &str) -> Document {
    entity(id, entity_type, json!(["Basic-Object", "Internal-Object"])).with("created_at", created_at)
}

fn endpoint(id: &str, role: &str, types: serde_json::Value) -> serde_json::Value {
    json!({"internal_id": id, "role": role, "types": types})
}

fn core_relation(id: &str, relationship_type: &str, created_at: &str, connections: serde_json::Value) -> Document {
    Document::new(id)
        .with("standard_id", standard_id("relationship", &[("id", id)]))
        .with("entity_type", relationship_type)
        .with("base_type", schema::BASE_TYPE_RELATION)
        .with("relationship_type", relationship_type)
        .with(
            "parent_types",
            json!(["basic-relationship", "stix-relationship", "stix-core-relationship"]),
        )
        .with("created_at", created_at)
        .with("connections", connections)
}

fn meta_relation(id: &str, relationship_type: &str, created_at: &str, connections: serde_json::Value) -> Document {
    Document::new(id)
        .with("standard_id", standard_id("relationship", &[("id", id)]))
        .with("entity_type", relationship_type)
        .with("base_type", schema::BASE_TYPE_RELATION)
        .with("relationship_type", relationship_type)
        .with(
            "parent_types",
            json!(["basic-relationship", "stix-relationship", "stix-ref-relationship"]),
        )
        .with("created_at", created_at)
        .with("connections", connections)
}

const DOMAIN_TYPES: &[&str] = &["Malware", "Stix-Domain-Object", "Stix-Core-Object", "Stix-Object", "Basic-Object"];

fn fixture_documents() -> Vec<Document> {
    let mut docs = Vec::new();

    // Eleven marking definitions, all colored. TLP:RED and PAP:RED
    // deliberately share a color.
    let markings = [
        (MARKING_TLP_CLEAR, "TLP:CLEAR", "#ffffff", "2017-01-20T00:00:00.000Z"),
        ("marking-tlp-green", "TLP:GREEN", "#2e7d32", "2017-01-20T00:00:00.000Z"),
        ("marking-tlp-amber", "TLP:AMBER", "#d84315", "2020-02-25T09:00:00.000Z"),
        ("marking-tlp-amber-strict", "TLP:AMBER+STRICT", "#bf360c", "2020-02-25T09:00:00.000Z"),
        (MARKING_TLP_RED, "TLP:RED", "#c62828", "2020-02-25T09:00:00.000Z"),
        ("marking-tlp-test", "TLP:TEST", "#ff9800", "2020-02-25T09:00:00.000Z"),
        ("marking-pap-clear", "PAP:CLEAR", "#fafafa", "2020-02-25T09:00:00.000Z"),
        ("marking-pap-green", "PAP:GREEN", "#43a047", "2020-02-25T09:00:00.000Z"),
        ("marking-pap-amber", "PAP:AMBER", "#ef6c00", "2020-02-25T09:00:00.000Z"),
        ("marking-pap-red", "PAP:RED", "#c62828", "2020-02-25T09:00:00.000Z"),
        ("marking-pap-test", "PAP:TEST", "#9c27b0", "2020-02-25T09:00:00.000Z"),
    ];
    for (id, definition, color, created) in markings {
        docs.push(marking(id, definition, color, created));
    }

    docs.push(
        domain_object(MALWARE_PARADISE, "Malware", "Paradise Ransomware", "2019-09-30T08:00:00.000Z")
            .with(
                "description",
                "A ransomware achieving persistence with malicious scheduled tasks.",
            )
            .with("x_stixdex_stix_ids", json!([LEGACY_PARADISE_ID]))
            .with("rel_object-marking.internal_id", json!([MARKING_TLP_CLEAR]))
            .with("rel_uses.internal_id", json!([ATTACK_PATTERN_PHISHING]))
            .with("revoked", false),
    );
    docs.push(
        domain_object(MALWARE_MAZE, "Malware", "Maze", "2020-02-27T10:00:00.000Z")
            .with("description", "Maze ransomware exfiltrates data before encryption.")
            .with("rel_object-marking.internal_id", json!([MARKING_TLP_RED]))
            .with("rel_similar-to.internal_id", json!([ATTACK_PATTERN_PHISHING]))
            .with("revoked", false),
    );
    docs.push(
        domain_object(INDICATOR_HASH, "Indicator", "SHA-256 file indicator", "2019-10-05T11:00:00.000Z")
            .with("description", "Detects malicious payload delivery.")
            .with("pattern", "[file:hashes.'SHA-256' = '4bc1e3a2']"),
    );
    docs.push(
        domain_object(INDICATOR_URL, "Indicator", "Infrastructure URL indicator", "2020-04-20T09:00:00.000Z")
            .with(
                "description",
                "Tracks http://attack.mitre.org/groups/G0096 and https://attack.mitre.org/groups/G0096 infrastructure.",
            ),
    );
    docs.push(
        domain_object(INDICATOR_REGISTRY, "Indicator", "Registry indicator", "2020-04-25T09:00:00.000Z")
            .with("description", "Registry indicator flagging malicious autorun keys."),
    );
    docs.push(
        domain_object(ATTACK_PATTERN_PHISHING, "Attack-Pattern", "Spearphishing Attachment", "2019-09-25T10:00:00.000Z")
            .with(
                "description",
                "Adversaries send spearphishing emails with malicious attachments (Citation: SP800-150). Mapped to ATT&CK T1566.",
            ),
    );
    docs.push(
        domain_object(ATTACK_PATTERN_SCHTASK, "Attack-Pattern", "Scheduled Task", "2019-08-10T10:00:00.000Z")
            .with(
                "description",
                "[APT41] has abused scheduled tasks for persistence (Citation: FireEye APT41). Mapped to ATT&CK T1053.",
            ),
    );
    docs.push(
        domain_object(INTRUSION_SET_APT41, "Intrusion-Set", "APT41", "2020-02-10T10:00:00.000Z")
            .with(
                "description",
                "APT41 overlaps with public reporting at http://attack.mitre.org/groups/G0096 and https://attack.mitre.org/groups/G0096.",
            ),
    );
    docs.push(
        domain_object(CAMPAIGN_SHADOW, "Campaign", "Operation Shadow", "2020-01-15T10:00:00.000Z")
            .with("description", "Campaign delivering Maze with malicious droppers."),
    );
    docs.push(
        domain_object(REPORT_QUARTERLY, "Report", "Quarterly threat landscape", "2020-03-01T09:00:00.000Z")
            .with("description", "Report covering ransomware operations.")
            .with("published", "2020-03-01T14:30:00.000Z")
            .with("rel_object-marking.internal_id", json!([MARKING_TLP_RED])),
    );

    // Internal objects: groups with confidence levels, settings.
    let groups = [
        ("group-analysts", "Analysts", 100),
        ("group-hunters", "Hunters", 90),
        ("group-responders", "Responders", 70),
        ("group-reviewers", "Reviewers", 50),
        ("group-interns", "Interns", 30),
    ];
    for (id, name, confidence) in groups {
        docs.push(
            internal_object(id, "Group", "2023-01-10T00:00:00.000Z")
                .with("name", name)
                .with("group_confidence_level", json!({"max_confidence": confidence, "overrides": []})),
        );
    }
    docs.push(
        internal_object("entity-setting-user", "EntitySetting", "2023-01-10T00:00:00.000Z")
            .with("target_type", "User")
            .with("otp_mandatory", true),
    );
    docs.push(
        internal_object("entity-setting-malware", "EntitySetting", "2023-01-10T00:00:00.000Z")
            .with("target_type", "Malware")
            .with("otp_mandatory", false),
    );
    docs.push(
        internal_object("platform-settings", "Settings", "2023-01-10T00:00:00.000Z")
            .with("platform_title", "stixdex"),
    );

    // Relations.
    docs.push(core_relation(
        REL_USES_PARADISE,
        "uses",
        "2019-10-01T10:00:00.000Z",
        json!([
            endpoint(MALWARE_PARADISE, "uses_from", json!(DOMAIN_TYPES)),
            endpoint(
                ATTACK_PATTERN_PHISHING,
                "uses_to",
                json!(["Attack-Pattern", "Stix-Domain-Object", "Stix-Core-Object", "Stix-Object", "Basic-Object"])
            ),
        ]),
    ));
    docs.push(core_relation(
        "rel-uses-2",
        "uses",
        "2020-02-15T10:00:00.000Z",
        json!([
            endpoint(
                INTRUSION_SET_APT41,
                "uses_from",
                json!(["Intrusion-Set", "Stix-Domain-Object", "Stix-Core-Object", "Stix-Object", "Basic-Object"])
            ),
            endpoint(
                ATTACK_PATTERN_SCHTASK,
                "uses_to",
                json!(["Attack-Pattern", "Stix-Domain-Object", "Stix-Core-Object", "Stix-Object", "Basic-Object"])
            ),
        ]),
    ));
    docs.push(core_relation(
        REL_INDICATES_PARADISE,
        "indicates",
        "2019-10-06T10:00:00.000Z",
        json!([
            // stored target-first on purpose: rebuild must not rely on order
            endpoint(MALWARE_PARADISE, "indicates_to", json!(DOMAIN_TYPES)),
            endpoint(
                INDICATOR_HASH,
                "indicates_from",
                json!(["Indicator", "Stix-Domain-Object", "Stix-Core-Object", "Stix-Object", "Basic-Object"])
            ),
        ]),
    ));
    docs.push(meta_relation(
        "rel-marking-maze",
        "object-marking",
        "2020-02-27T10:00:00.000Z",
        json!([
            endpoint(MALWARE_MAZE, "object-marking_from", json!(DOMAIN_TYPES)),
            endpoint(
                MARKING_TLP_RED,
                "object-marking_to",
                json!(["Marking-Definition", "Stix-Meta-Object", "Stix-Object", "Basic-Object"])
            ),
        ]),
    ));
    docs.push(meta_relation(
        "rel-marking-report",
        "object-marking",
        "2020-03-01T09:00:00.000Z",
        json!([
            endpoint(
                REPORT_QUARTERLY,
                "object-marking_from",
                json!(["Report", "Stix-Domain-Object", "Stix-Core-Object", "Stix-Object", "Basic-Object"])
            ),
            endpoint(
                MARKING_TLP_RED,
                "object-marking_to",
                json!(["Marking-Definition", "Stix-Meta-Object", "Stix-Object", "Basic-Object"])
            ),
        ]),
    ));

    docs
}

/// Engine over a counting store, fully seeded.
pub async fn seeded_engine() -> TestHarness {
    init_tracing();
    let store = Arc::new(CountingStore::new());
    let engine = Engine::init(store.clone(), EngineConfig::new("test")).await.unwrap();
    let ctx = AuthContext::new("testing");
    let admin = Principal::privileged("admin");
    engine
        .index_elements(&ctx, &admin, "fixture-load", fixture_documents())
        .await
        .unwrap();
    TestHarness { engine, ctx, admin, store }
}
