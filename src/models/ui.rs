use serde_json::Value;

/// One element of a device UI snapshot, decoded defensively from the raw
/// automation payload. Malformed entries are dropped, never fatal.
#[derive(Debug, Clone, Default)]
pub struct UiNode {
    pub text: Option<String>,
    pub content_description: Option<String>,
    pub resource_id: Option<String>,
    pub bounds: Option<Bounds>,
    pub children: Vec<UiNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bounds {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// Typed view of one device snapshot: foreground app identity plus the
/// accessibility tree. The tree is owned by the snapshot and discarded after
/// each cycle.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub package: String,
    pub app_name: String,
    pub tree: Vec<UiNode>,
}

impl DeviceState {
    /// Decode the raw portal payload. Missing or mistyped sections yield an
    /// empty tree and empty identity strings rather than an error.
    pub fn from_payload(payload: &Value) -> Self {
        let tree = payload
            .get("a11y_tree")
            .and_then(Value::as_array)
            .map(|nodes| nodes.iter().filter_map(decode_node).collect())
            .unwrap_or_default();

        let meta = payload.get("phone_state");
        let package = meta
            .and_then(|m| m.get("packageName"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let app_name = meta
            .and_then(|m| m.get("currentApp"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            package,
            app_name,
            tree,
        }
    }
}

fn decode_node(value: &Value) -> Option<UiNode> {
    let obj = value.as_object()?;

    let children = obj
        .get("children")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(decode_node).collect())
        .unwrap_or_default();

    Some(UiNode {
        text: string_field(obj.get("text")),
        content_description: string_field(obj.get("content_description")),
        resource_id: string_field(obj.get("resourceId")),
        bounds: obj
            .get("bounds")
            .and_then(Value::as_str)
            .and_then(parse_bounds),
        children,
    })
}

/// Accepts strings and numbers; anything else is treated as absent.
fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Bounds arrive as "x1,y1,x2,y2".
fn parse_bounds(raw: &str) -> Option<Bounds> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<i32>());
    let x1 = parts.next()?.ok()?;
    let y1 = parts.next()?.ok()?;
    let x2 = parts.next()?.ok()?;
    let y2 = parts.next()?.ok()?;
    Some(Bounds { x1, y1, x2, y2 })
}
