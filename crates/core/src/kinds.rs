//! Closed type enumerations accepted by the target instance.
//!
//! Source records carry their type as a free-form string ("http", "real-browser",
//! "rocket.chat", "GoogleChat", ...). Translation goes through [`normalize_type_name`] and an
//! explicit lookup table; a miss is an explicit `None`, never a guess.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::EntityKind;

/// Normalize a raw type string into a table key: `-` and `.` become `_`, then upper-case.
pub fn normalize_type_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c == '-' || c == '.' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

macro_rules! type_table {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $key:literal, $wire:literal;)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// String the target instance stores for this type.
            pub fn as_wire(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)*
                }
            }

            /// Look up an already normalized key (see [`normalize_type_name`]).
            pub fn from_normalized(key: &str) -> Option<Self> {
                match key {
                    $($key => Some($name::$variant),)*
                    _ => None,
                }
            }

            /// Normalize then look up a raw source type string.
            pub fn resolve(raw: &str) -> Option<Self> {
                Self::from_normalized(&normalize_type_name(raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_wire())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.as_wire())
            }
        }
    };
}

type_table! {
    /// Monitor discriminator.
    MonitorType {
        Http => "HTTP", "http";
        Port => "PORT", "port";
        Ping => "PING", "ping";
        Keyword => "KEYWORD", "keyword";
        JsonQuery => "JSON_QUERY", "json-query";
        GrpcKeyword => "GRPC_KEYWORD", "grpc-keyword";
        Dns => "DNS", "dns";
        Docker => "DOCKER", "docker";
        RealBrowser => "REAL_BROWSER", "real-browser";
        Push => "PUSH", "push";
        Steam => "STEAM", "steam";
        Gamedig => "GAMEDIG", "gamedig";
        Mqtt => "MQTT", "mqtt";
        KafkaProducer => "KAFKA_PRODUCER", "kafka-producer";
        SqlServer => "SQLSERVER", "sqlserver";
        Postgres => "POSTGRES", "postgres";
        Mysql => "MYSQL", "mysql";
        Mongodb => "MONGODB", "mongodb";
        Radius => "RADIUS", "radius";
        Redis => "REDIS", "redis";
        Group => "GROUP", "group";
        TailscalePing => "TAILSCALE_PING", "tailscale-ping";
        Snmp => "SNMP", "snmp";
        Rabbitmq => "RABBITMQ", "rabbitmq";
    }
}

type_table! {
    /// Notification provider discriminator.
    NotificationType {
        Alerta => "ALERTA", "alerta";
        AlertNow => "ALERTNOW", "AlertNow";
        Apprise => "APPRISE", "apprise";
        Bark => "BARK", "Bark";
        Bitrix24 => "BITRIX24", "Bitrix24";
        Cellsynt => "CELLSYNT", "Cellsynt";
        ClickSendSms => "CLICKSENDSMS", "clicksendsms";
        DingDing => "DINGDING", "DingDing";
        Discord => "DISCORD", "discord";
        Feishu => "FEISHU", "Feishu";
        FlashDuty => "FLASHDUTY", "FlashDuty";
        FreeMobile => "FREEMOBILE", "FreeMobile";
        GoAlert => "GOALERT", "GoAlert";
        GoogleChat => "GOOGLECHAT", "GoogleChat";
        Gorush => "GORUSH", "gorush";
        Gotify => "GOTIFY", "gotify";
        GtxMessaging => "GTXMESSAGING", "gtxmessaging";
        HomeAssistant => "HOMEASSISTANT", "HomeAssistant";
        Keep => "KEEP", "Keep";
        Kook => "KOOK", "Kook";
        Line => "LINE", "line";
        LineNotify => "LINENOTIFY", "LineNotify";
        LunaSea => "LUNASEA", "lunasea";
        Matrix => "MATRIX", "matrix";
        Mattermost => "MATTERMOST", "mattermost";
        Nostr => "NOSTR", "nostr";
        Ntfy => "NTFY", "ntfy";
        Octopush => "OCTOPUSH", "octopush";
        OneBot => "ONEBOT", "OneBot";
        Opsgenie => "OPSGENIE", "Opsgenie";
        PagerDuty => "PAGERDUTY", "PagerDuty";
        PagerTree => "PAGERTREE", "PagerTree";
        PromoSms => "PROMOSMS", "promosms";
        Pushbullet => "PUSHBULLET", "pushbullet";
        PushByTechulus => "PUSHBYTECHULUS", "PushByTechulus";
        PushDeer => "PUSHDEER", "PushDeer";
        Pushover => "PUSHOVER", "pushover";
        Pushy => "PUSHY", "pushy";
        RocketChat => "ROCKET_CHAT", "rocket.chat";
        ServerChan => "SERVERCHAN", "ServerChan";
        SerwerSms => "SERWERSMS", "serwersms";
        SevenIo => "SEVENIO", "SevenIO";
        Signal => "SIGNAL", "signal";
        Signl4 => "SIGNL4", "SIGNL4";
        Slack => "SLACK", "slack";
        Smsc => "SMSC", "smsc";
        SmsEagle => "SMSEAGLE", "SMSEagle";
        SmsManager => "SMSMANAGER", "SMSManager";
        Smtp => "SMTP", "smtp";
        Splunk => "SPLUNK", "Splunk";
        Squadcast => "SQUADCAST", "squadcast";
        Stackfield => "STACKFIELD", "stackfield";
        Teams => "TEAMS", "teams";
        Telegram => "TELEGRAM", "telegram";
        Threema => "THREEMA", "threema";
        Twilio => "TWILIO", "twilio";
        Webhook => "WEBHOOK", "webhook";
        WeCom => "WECOM", "WeCom";
        Whapi => "WHAPI", "whapi";
        WPush => "WPUSH", "WPush";
        ZohoCliq => "ZOHOCLIQ", "ZohoCliq";
    }
}

/// Resolved discriminator of either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discriminator {
    Monitor(MonitorType),
    Notification(NotificationType),
}

impl Discriminator {
    /// Resolve a raw type string for the given kind.
    pub fn resolve(kind: EntityKind, raw: &str) -> Option<Self> {
        match kind {
            EntityKind::Monitor => MonitorType::resolve(raw).map(Discriminator::Monitor),
            EntityKind::Notification => NotificationType::resolve(raw).map(Discriminator::Notification),
        }
    }

    pub fn kind(self) -> EntityKind {
        match self {
            Discriminator::Monitor(_) => EntityKind::Monitor,
            Discriminator::Notification(_) => EntityKind::Notification,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Discriminator::Monitor(t) => t.as_wire(),
            Discriminator::Notification(t) => t.as_wire(),
        }
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}
