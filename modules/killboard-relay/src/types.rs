use std::fmt;

/// A rendered notification, independent of the backend that delivers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Logical target channel, resolved to a concrete webhook by the router.
    pub channel: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub fields: Vec<Field>,
    pub image_url: Option<String>,
    pub color: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Message {
    pub fn new(channel: &str, title: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            title: title.into(),
            description: None,
            url: None,
            fields: Vec::new(),
            image_url: None,
            color: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn field(mut self, name: &str, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Outcome of one poll over a single stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub fetched: u64,
    pub delivered: u64,
    pub duplicates: u64,
    pub excluded: u64,
    pub malformed: u64,
    pub primed: bool,
    pub fetch_failed: bool,
    pub delivery_failed: bool,
}

impl TickStats {
    /// Nothing happened worth an info-level log line.
    pub fn is_quiet(&self) -> bool {
        self.delivered == 0
            && self.excluded == 0
            && self.malformed == 0
            && !self.primed
            && !self.fetch_failed
            && !self.delivery_failed
    }
}

impl fmt::Display for TickStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} delivered={} duplicates={} excluded={} malformed={}",
            self.fetched, self.delivered, self.duplicates, self.excluded, self.malformed,
        )?;
        if self.primed {
            write!(f, " primed")?;
        }
        if self.fetch_failed {
            write!(f, " fetch_failed")?;
        }
        if self.delivery_failed {
            write!(f, " delivery_failed")?;
        }
        Ok(())
    }
}

/// Stats from one poller tick across both streams.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub kills: TickStats,
    pub deaths: TickStats,
}

impl RelayStats {
    pub fn is_quiet(&self) -> bool {
        self.kills.is_quiet() && self.deaths.is_quiet()
    }
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kills({}) deaths({})", self.kills, self.deaths)
    }
}
