use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Body of `POST /mcpcall`
#[derive(Debug, Serialize, Deserialize)]
pub struct UserQuery {
    pub query: String,
    pub mcp_config: McpConfig,
}

/// One entry of `mcpServers`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpServerEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Fields the gateway does not use (command, headers, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl McpServerEntry {
    pub fn is_sse(&self) -> bool {
        self.kind == "sse"
    }
}

/// MCP servers of a request. Entries keep the order of the JSON object,
/// since server indices in tool names derive from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpConfig {
    servers: Vec<(String, McpServerEntry)>,
}

impl McpConfig {
    pub fn servers(&self) -> impl Iterator<Item = (&str, &McpServerEntry)> {
        self.servers
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[derive(Deserialize)]
struct RawMcpConfig {
    #[serde(rename = "mcpServers", deserialize_with = "ordered_servers")]
    servers: Vec<(String, McpServerEntry)>,
}

impl<'de> Deserialize<'de> for McpConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawMcpConfig::deserialize(deserializer)?;
        Ok(Self {
            servers: raw.servers,
        })
    }
}

impl Serialize for McpConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        struct Servers<'a>(&'a [(String, McpServerEntry)]);

        impl Serialize for Servers<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (name, entry) in self.0 {
                    map.serialize_entry(name, entry)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("mcpServers", &Servers(&self.servers))?;
        map.end()
    }
}

fn ordered_servers<'de, D>(deserializer: D) -> Result<Vec<(String, McpServerEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedServers;

    impl<'de> Visitor<'de> for OrderedServers {
        type Value = Vec<(String, McpServerEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of server name to server config")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut servers = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, entry)) = access.next_entry::<String, McpServerEntry>()? {
                // A repeated key replaces the earlier entry, keeping its position
                match servers.iter_mut().find(|(n, _)| *n == name) {
                    Some(existing) => existing.1 = entry,
                    None => servers.push((name, entry)),
                }
            }
            Ok(servers)
        }
    }

    deserializer.deserialize_map(OrderedServers)
}
