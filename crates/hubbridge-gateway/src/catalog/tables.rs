/*!
 * Static model and attribute tables.
 *
 * Rows are `(wire key, firmware name, canonical name, consumer domain)`.
 */

use crate::device::{AttributeMapping, Domain, SchemaKind};

use super::{CatalogEntry, ModelInfo};

use crate::device::Domain::*;

const fn p(
    wire: &'static str,
    internal: Option<&'static str>,
    canonical: &'static str,
    domain: Option<Domain>,
) -> AttributeMapping {
    AttributeMapping::new(Some(wire), internal, canonical, domain)
}

const fn derived(
    internal: Option<&'static str>,
    canonical: &'static str,
    domain: Domain,
) -> AttributeMapping {
    AttributeMapping::new(None, internal, canonical, Some(domain))
}

const fn model(
    model: &'static str,
    manufacturer: &'static str,
    name: &'static str,
    product_code: &'static str,
) -> ModelInfo {
    ModelInfo {
        model,
        manufacturer,
        name,
        product_code: Some(product_code),
    }
}

/// Wire keys shared verbatim by nearly every device family
pub(crate) static GLOBAL_ALIASES: &[(&str, &str)] = &[
    ("0.11.85", "load_voltage"),
    ("0.13.85", "consumption"),
    ("0.14.85", "load_current"),
    ("8.0.2001", "battery"),
    ("8.0.2002", "reset_cnt"),
    ("8.0.2003", "send_all_cnt"),
    ("8.0.2004", "send_fail_cnt"),
    ("8.0.2005", "send_retry_cnt"),
    ("8.0.2006", "chip_temperature"),
    ("8.0.2007", "lqi"),
    ("8.0.2008", "voltage"),
    ("8.0.2009", "pv_state"),
    ("8.0.2010", "cur_state"),
    ("8.0.2011", "pre_state"),
    ("8.0.2012", "power_tx"),
    ("8.0.2013", "CCA"),
    ("8.0.2014", "protect"),
    ("8.0.2015", "power"),
    ("8.0.2016", "list"),
    ("8.0.2021", "report"),
    ("8.0.2022", "fw_ver"),
    ("8.0.2023", "hw_ver"),
    ("8.0.2030", "poweroff_memory"),
    ("8.0.2031", "charge_protect"),
    ("8.0.2032", "en_night_tip_light"),
    ("8.0.2034", "load_s0"),
    ("8.0.2035", "load_s1"),
    ("8.0.2036", "parent"),
    ("8.0.2041", "model"),
    ("8.0.2042", "max_power"),
    ("8.0.2044", "plug_detection"),
    ("8.0.2080", "zgb_ver"),
    ("8.0.2082", "removed_did"),
    ("8.0.2084", "added_device"),
    ("8.0.2089", "dfu"),
    ("8.0.2091", "dfu_status"),
    ("8.0.2101", "nl_invert"),
    ("8.0.2102", "alive"),
    ("8.0.2109", "paring"),
    ("8.0.2111", "pair_command"),
    ("8.0.2151", "zigbee_pa"),
    ("8.0.9001", "battery_end_of_life"),
    ("20.4.85", "control"),
];

static GATEWAY_PARAMS: &[AttributeMapping] = &[
    p("8.0.2012", None, "power_tx", None),
    p("8.0.2024", None, "channel", None),
    p("8.0.2081", None, "pairing_stop", None),
    p("8.0.2082", None, "removed_did", None),
    p("8.0.2084", None, "added_device", None),
    p("8.0.2092", None, "ir_shoot", None),
    p("8.0.2103", None, "device_model", None),
    p("8.0.2109", None, "paring", None),
    p("8.0.2110", None, "discovered_mac", None),
    p("8.0.2111", None, "pair_command", None),
    p("8.0.2157", None, "panId", None),
    p("8.0.2155", None, "cloud", None),
    p("0.3.85", Some("illumination"), "illuminance", Some(Sensor)),
    derived(Some("rgb_color"), "rgb_color", Light),
    derived(None, "pair", Remote),
];

static PLUG_PARAMS: &[AttributeMapping] = &[
    p("0.12.85", Some("load_power"), "power", Some(Sensor)),
    p("0.13.85", None, "consumption", Some(Sensor)),
    p("4.1.85", Some("neutral_0"), "switch", Some(Switch)),
];

static PLUG_86_AQ1_PARAMS: &[AttributeMapping] = &[
    p("0.12.85", Some("load_power"), "power", Some(Sensor)),
    p("0.13.85", None, "consumption", Some(Sensor)),
    p("4.1.85", Some("channel_0"), "switch", Some(Switch)),
];

static PLUG_USB_PARAMS: &[AttributeMapping] = &[
    p("0.11.85", Some("load_voltage"), "power", None),
    p("0.12.85", Some("load_power"), "power", Some(Sensor)),
    p("0.13.85", None, "consumption", Some(Sensor)),
    p("4.1.85", Some("neutral_0"), "switch", Some(Switch)),
    p("4.2.85", Some("neutral_1"), "switch_usb", Some(Switch)),
];

static SINGLE_SWITCH_N_PARAMS: &[AttributeMapping] = &[
    p("0.12.85", Some("load_power"), "power", Some(Sensor)),
    p("0.13.85", None, "consumption", Some(Sensor)),
    p("4.1.85", Some("neutral_0"), "switch", Some(Switch)),
    p("13.1.85", None, "button", None),
    derived(None, "switch", BinarySensor),
];

static DOUBLE_SWITCH_N_PARAMS: &[AttributeMapping] = &[
    p("0.11.85", Some("load_voltage"), "power", None),
    p("0.12.85", Some("load_power"), "power", Some(Sensor)),
    p("0.13.85", None, "consumption", Some(Sensor)),
    p("4.1.85", Some("channel_0"), "channel 1", Some(Switch)),
    p("4.2.85", Some("channel_1"), "channel 2", Some(Switch)),
    p("13.1.85", None, "button_1", None),
    p("13.2.85", None, "button_2", None),
    p("13.5.85", None, "button_both", None),
    derived(None, "switch", BinarySensor),
];

static SINGLE_SWITCH_PARAMS: &[AttributeMapping] = &[
    p("4.1.85", Some("channel_0"), "switch", Some(Switch)),
    p("13.1.85", None, "button", None),
    derived(None, "switch", BinarySensor),
];

static DOUBLE_SWITCH_PARAMS: &[AttributeMapping] = &[
    p("4.1.85", Some("channel_0"), "channel 1", Some(Switch)),
    p("4.2.85", Some("channel_1"), "channel 2", Some(Switch)),
    p("13.1.85", None, "button_1", None),
    p("13.2.85", None, "button_2", None),
    p("13.5.85", None, "button_both", None),
    derived(None, "switch", BinarySensor),
];

static CUBE_PARAMS: &[AttributeMapping] = &[
    p("0.2.85", None, "duration", None),
    p("0.3.85", None, "angle", None),
    p("13.1.85", None, "action", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static BULB_PARAMS: &[AttributeMapping] = &[
    p("4.1.85", Some("power_status"), "light", Some(Light)),
    p("14.1.85", Some("light_level"), "brightness", None),
    p("14.2.85", Some("colour_temperature"), "color_temp", None),
];

static DIMMABLE_PARAMS: &[AttributeMapping] = &[
    p("4.1.85", Some("power_status"), "light", Some(Light)),
    p("14.1.85", Some("light_level"), "brightness", None),
];

static BUTTON_PARAMS: &[AttributeMapping] = &[
    p("13.1.85", None, "button", None),
    derived(None, "switch", BinarySensor),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static MULTI_BUTTON_PARAMS: &[AttributeMapping] = &[
    p("13.1.85", None, "button_1", None),
    p("13.2.85", None, "button_2", None),
    p("13.3.85", None, "button_3", None),
    p("13.4.85", None, "button_4", None),
    p("13.6.85", None, "button_5", None),
    p("13.7.85", None, "button_6", None),
    p("13.5.85", None, "button_both", None),
    derived(None, "switch", BinarySensor),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static TH_PARAMS: &[AttributeMapping] = &[
    p("0.1.85", Some("temperature"), "temperature", Some(Sensor)),
    p("0.2.85", Some("humidity"), "humidity", Some(Sensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static WEATHER_PARAMS: &[AttributeMapping] = &[
    p("0.1.85", Some("temperature"), "temperature", Some(Sensor)),
    p("0.2.85", Some("humidity"), "humidity", Some(Sensor)),
    p("0.3.85", Some("pressure"), "pressure", Some(Sensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static MAGNET_PARAMS: &[AttributeMapping] = &[
    p("3.1.85", Some("status"), "contact", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static MOTION_PARAMS: &[AttributeMapping] = &[
    p("3.1.85", None, "motion", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static MOTION_LUX_PARAMS: &[AttributeMapping] = &[
    p("0.3.85", Some("lux"), "illuminance_lux", None),
    p("0.4.85", Some("illumination"), "illuminance", Some(Sensor)),
    p("3.1.85", None, "motion", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static LEAK_PARAMS: &[AttributeMapping] = &[
    p("3.1.85", Some("alarm"), "moisture", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static VIBRATION_PARAMS: &[AttributeMapping] = &[
    p("0.1.85", None, "bed_activity", None),
    p("0.2.85", None, "tilt_angle", None),
    p("0.3.85", None, "vibrate_intensity", None),
    p("13.1.85", None, "vibration", None),
    p("14.1.85", None, "vibration_level", None),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
    derived(None, "action", BinarySensor),
];

static LIGHT_SENSOR_T1_PARAMS: &[AttributeMapping] = &[
    p("0.3.85", None, "illuminance", Some(Sensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static LIGHT_SENSOR_SPEC: &[AttributeMapping] = &[
    p("2.1", Some("2.1"), "illuminance", Some(Sensor)),
    p("3.1", Some("3.1"), "battery", Some(Sensor)),
];

static SMOKE_PARAMS: &[AttributeMapping] = &[
    p("0.1.85", Some("density"), "smoke density", Some(Sensor)),
    p("13.1.85", Some("alarm"), "smoke", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static GAS_PARAMS: &[AttributeMapping] = &[
    p("0.1.85", Some("density"), "gas density", Some(Sensor)),
    p("13.1.85", Some("alarm"), "gas", Some(BinarySensor)),
];

static CURTAIN_PARAMS: &[AttributeMapping] = &[
    p("1.1.85", Some("curtain_level"), "position", None),
    p("14.2.85", None, "motor", Some(Cover)),
    p("14.3.85", Some("cfg_param"), "cfg_param", None),
    p("14.4.85", Some("run_state"), "run_state", None),
];

static CURTAIN_BATTERY_PARAMS: &[AttributeMapping] = &[
    p("1.1.85", Some("curtain_level"), "position", None),
    p("14.2.85", None, "motor", Some(Cover)),
    p("14.3.85", Some("cfg_param"), "cfg_param", None),
    p("14.4.85", Some("run_state"), "run_state", None),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static LOCK_PARAMS: &[AttributeMapping] = &[
    p("13.1.85", None, "key_id", Some(Sensor)),
    p("13.20.85", Some("lock_state"), "lock", Some(BinarySensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
];

static LOCK_P100_PARAMS: &[AttributeMapping] = &[
    p("8.0.2148", None, "timestamp", None),
    p("13.1.85", None, "unlock from inside", None),
    p("13.15.85", None, "key_id", Some(Sensor)),
    p("13.20.85", Some("lock_state"), "lock", Some(Sensor)),
    p("13.31.85", Some("voltage"), "voltage", None),
    p("13.32.85", Some("li battery"), "li battery", Some(Sensor)),
    p("13.37.85", Some("battery"), "battery", Some(Sensor)),
];

static THERMOSTAT_PARAMS: &[AttributeMapping] = &[
    p("3.1.85", Some("power_status"), "power", None),
    p("3.2.85", None, "current_temperature", None),
    p("14.2.85", Some("ac_state"), "climate", Some(Climate)),
    p("14.8.85", None, "mode", None),
    p("14.9.85", None, "target_temperature", None),
    p("14.10.85", None, "fan_mode", None),
];

static AIR_MONITOR_PARAMS: &[AttributeMapping] = &[
    p("0.1.85", Some("temperature"), "temperature", Some(Sensor)),
    p("0.2.85", Some("humidity"), "humidity", Some(Sensor)),
    p("0.3.85", Some("tvoc"), "tvoc", Some(Sensor)),
    p("8.0.2001", Some("battery"), "battery", Some(Sensor)),
    p("13.1.85", Some("alarm"), "tvoc_level", Some(AirQuality)),
    p("14.1.85", None, "unit", None),
];

static RELAY_T1_LEGACY: &[AttributeMapping] = &[
    p("4.1.85", Some("channel_0"), "switch", Some(Switch)),
];

static RELAY_T1_N_LEGACY: &[AttributeMapping] = &[
    p("0.12.85", Some("load_power"), "power", Some(Sensor)),
    p("0.13.85", None, "consumption", Some(Sensor)),
    p("4.1.85", Some("channel_0"), "switch", Some(Switch)),
];

static RELAY_T1_SPEC: &[AttributeMapping] = &[p("2.1", Some("2.1"), "switch", Some(Switch))];

static RELAY_T1_N_SPEC: &[AttributeMapping] = &[
    p("2.1", Some("2.1"), "switch", Some(Switch)),
    p("3.2", Some("3.2"), "power", Some(Sensor)),
];

/// Models whose encoding does not depend on the coordinator's cloud
pub(crate) static COMMON: &[CatalogEntry] = &[
    CatalogEntry {
        models: &[
            model("lumi.gateway.acn01", "Aqara", "Gateway M1S", "ZHWG15LM"),
            model("lumi.aircondition.acn05", "Aqara", "AirCondition P3", "KTBL12LM"),
            model("lumi.gateway.iragl5", "Aqara", "Gateway M2", "ZHWG12LM"),
            model("lumi.gateway.iragl7", "Aqara", "Gateway M2", "HM2-G01"),
            model("lumi.gateway.sacn01", "Aqara", "Smart Hub H1", "QBCZWG11LM"),
            model("lumi.gateway.aqcn02", "Aqara", "Hub E1", "ZHWG16LM"),
            model("lumi.camera.gwagl02", "Aqara", "Camera Hub G2H", "ZNSXJ12LM"),
            model("lumi.camera.gwpagl01", "Aqara", "Camera Hub G3", "ZNSXJ13LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: GATEWAY_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.plug", "Xiaomi", "Plug", "ZNCZ02LM"),
            model("lumi.plug.mitw01", "Xiaomi", "Plug TW", "ZNCZ03LM"),
            model("lumi.plug.mmeu01", "Xiaomi", "Plug EU", "ZNCZ04LM"),
            model("lumi.plug.maus01", "Xiaomi", "Plug US", "ZNCZ12LM"),
            model("lumi.ctrl_86plug", "Aqara", "Socket", "QBCZ11LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: PLUG_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.ctrl_86plug.aq1", "Aqara", "Socket", "QBCZ11LM")],
        schema: SchemaKind::Legacy,
        mappings: PLUG_86_AQ1_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.plug.sacn03", "Aqara", "Socket H1 USB", "QBCZ15LM")],
        schema: SchemaKind::Legacy,
        mappings: PLUG_USB_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.ctrl_ln1", "Aqara", "Single Wall Switch", "QBKG11LM"),
            model("lumi.ctrl_ln1.aq1", "Aqara", "Single Wall Switch", "QBKG11LM"),
            model("lumi.switch.b1nacn02", "Aqara", "Single Wall Switch D1", "QBKG23LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: SINGLE_SWITCH_N_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.relay.c2acn01", "Aqara", "Relay", "LLKZMK11LM"),
            model("lumi.ctrl_ln2", "Aqara", "Double Wall Switch", "QBKG12LM"),
            model("lumi.ctrl_ln2.aq1", "Aqara", "Double Wall Switch", "QBKG12LM"),
            model("lumi.switch.b2nacn02", "Aqara", "Double Wall Switch D1", "QBKG24LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: DOUBLE_SWITCH_N_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.switch.b1lacn02", "Aqara", "Single Wall Switch D1", "QBKG21LM")],
        schema: SchemaKind::Legacy,
        mappings: SINGLE_SWITCH_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.switch.b2lacn02", "Aqara", "Double Wall Switch D1", "QBKG22LM"),
            model("lumi.switch.b2laus01", "Aqara", "Double Wall Switch US", "WS-USC02"),
            model("lumi.switch.n2acn1", "Aqara", "Double Wall Switch H1 PRO", "QBKG31LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: DOUBLE_SWITCH_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.sensor_cube", "Aqara", "Cube", "MFKZQ01LM"),
            model("lumi.sensor_cube.aqgl01", "Aqara", "Cube", "MFKZQ01LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: CUBE_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.light.aqcn02", "Aqara", "Bulb", "ZNLDP12LM"),
            model("lumi.light.cwopcn02", "Aqara", "Opple MX650", "XDD12LM"),
            model("lumi.light.cwopcn03", "Aqara", "Opple MX480", "XDD13LM"),
            model("ikea.light.led1545g12", "IKEA", "Bulb E27 980 lm", "LED1545G12"),
            model("ikea.light.led1546g12", "IKEA", "Bulb E27 950 lm", "LED1546G12"),
            model("ikea.light.led1536g5", "IKEA", "Bulb E14 400 lm", "LED1536G5"),
            model("ikea.light.led1537r6", "IKEA", "Bulb GU10 400 lm", "LED1537R6"),
        ],
        schema: SchemaKind::Legacy,
        mappings: BULB_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("ikea.light.led1623g12", "IKEA", "Bulb E27 1000 lm", "LED1623G12"),
            model("ikea.light.led1650r5", "IKEA", "Bulb GU10 400 lm", "LED1650R5"),
            model("ikea.light.led1649c5", "IKEA", "Bulb E14", "LED1649C5"),
            model("lumi.light.cbacn1", "Aqara", "LED Controller T1", "HLQDQ01LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: DIMMABLE_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.sensor_switch", "Xiaomi", "Button", "WXKG01LM"),
            model("lumi.sensor_switch.aq2", "Aqara", "Button", "WXKG11LM"),
            model("lumi.remote.b1acn01", "Aqara", "Button", "WXKG11LM"),
            model("lumi.sensor_switch.aq3", "Aqara", "Shake Button", "WXKG12LM"),
            model("lumi.sensor_86sw1", "Aqara", "Single Wall Button", "WXKG03LM"),
            model("lumi.remote.b186acn01", "Aqara", "Single Wall Button", "WXKG03LM"),
            model("lumi.remote.b186acn02", "Aqara", "Single Wall Button D1", "WXKG06LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: BUTTON_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.sensor_86sw2", "Aqara", "Double Wall Button", "WXKG02LM"),
            model("lumi.remote.b286acn01", "Aqara", "Double Wall Button", "WXKG02LM"),
            model("lumi.remote.b286acn02", "Aqara", "Double Wall Button D1", "WXKG07LM"),
            model("lumi.remote.b286opcn01", "Aqara", "Opple Two Button", "WXCJKG11LM"),
            model("lumi.remote.b486opcn01", "Aqara", "Opple Four Button", "WXCJKG12LM"),
            model("lumi.remote.b686opcn01", "Aqara", "Opple Six Button", "WXCJKG13LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: MULTI_BUTTON_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.sensor_ht", "Xiaomi", "TH Sensor", "WSDCGQ01LM")],
        schema: SchemaKind::Legacy,
        mappings: TH_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.weather", "Aqara", "TH Sensor", "WSDCGQ11LM"),
            model("lumi.sensor_ht.agl02", "Aqara", "TH Sensor", "WSDCGQ12LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: WEATHER_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.sensor_magnet", "Xiaomi", "Door Sensor", "MCCGQ01LM"),
            model("lumi.sensor_magnet.aq2", "Aqara", "Door Sensor", "MCCGQ11LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: MAGNET_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.sensor_motion", "Xiaomi", "Motion Sensor", "RTCGQ01LM"),
            model("lumi.motion.agl04", "Aqara", "Precision Motion Sensor", "RTCGQ13LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: MOTION_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.sensor_motion.aq2", "Aqara", "Motion Sensor", "RTCGQ11LM"),
            model("lumi.motion.agl02", "Aqara", "Motion Sensor T1", "RTCGQ12LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: MOTION_LUX_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.sensor_wleak.aq1", "Aqara", "Water Leak Sensor", "SJCGQ11LM")],
        schema: SchemaKind::Legacy,
        mappings: LEAK_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.vibration.aq1", "Aqara", "Vibration Sensor", "DJT11LM")],
        schema: SchemaKind::Legacy,
        mappings: VIBRATION_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.sen_ill.mgl01", "Xiaomi", "Light Sensor", "GZCGQ01LM")],
        schema: SchemaKind::SpecBased,
        mappings: LIGHT_SENSOR_SPEC,
    },
    CatalogEntry {
        models: &[model("lumi.sen_ill.agl01", "Aqara", "Light Sensor T1", "GZCGQ11LM")],
        schema: SchemaKind::Legacy,
        mappings: LIGHT_SENSOR_T1_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.sensor_smoke", "Honeywell", "Smoke Sensor", "JTYJ-GD-01LM/BW")],
        schema: SchemaKind::Legacy,
        mappings: SMOKE_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.sensor_natgas", "Honeywell", "Gas Sensor", "JTQJ-BF-01LM/BW")],
        schema: SchemaKind::Legacy,
        mappings: GAS_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.curtain", "Aqara", "Curtain", "ZNCLDJ11LM"),
            model("lumi.curtain.aq2", "Aqara", "Roller Shade", "ZNGZDJ11LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: CURTAIN_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.curtain.hagl04", "Aqara", "Curtain B1", "ZNCLDJ12LM")],
        schema: SchemaKind::Legacy,
        mappings: CURTAIN_BATTERY_PARAMS,
    },
    CatalogEntry {
        models: &[
            model("lumi.lock.aq1", "Aqara", "Door Lock S1", "ZNMS11LM"),
            model("lumi.lock.acn02", "Aqara", "Door Lock S2", "ZNMS12LM"),
            model("lumi.lock.acn03", "Aqara", "Door Lock S2 Pro", "ZNMS12LM"),
        ],
        schema: SchemaKind::Legacy,
        mappings: LOCK_PARAMS,
    },
    CatalogEntry {
        models: &[model("aqara.lock.wbzac1", "Aqara", "Door Lock P100", "ZNMS19LM")],
        schema: SchemaKind::Legacy,
        mappings: LOCK_P100_PARAMS,
    },
    CatalogEntry {
        models: &[model("lumi.airrtc.tcpecn02", "Aqara", "Thermostat S2", "KTWKQ03ES")],
        schema: SchemaKind::Legacy,
        mappings: THERMOSTAT_PARAMS,
    },
    CatalogEntry {
        models: &[model(
            "lumi.airmonitor.acn01",
            "Aqara",
            "Smart TVOC Air Quality Monitor",
            "VOCKQJK11LM",
        )],
        schema: SchemaKind::Legacy,
        mappings: AIR_MONITOR_PARAMS,
    },
];

/// Resource-code variants of models that change encoding with the cloud
pub(crate) static LEGACY: &[CatalogEntry] = &[
    CatalogEntry {
        models: &[model("lumi.switch.l0agl1", "Aqara", "Relay T1", "SSM-U02")],
        schema: SchemaKind::Legacy,
        mappings: RELAY_T1_LEGACY,
    },
    CatalogEntry {
        models: &[model("lumi.switch.n0agl1", "Aqara", "Relay T1", "SSM-U01")],
        schema: SchemaKind::Legacy,
        mappings: RELAY_T1_N_LEGACY,
    },
];

/// Spec-coordinate variants of models that change encoding with the cloud
pub(crate) static SPEC: &[CatalogEntry] = &[
    CatalogEntry {
        models: &[model("lumi.switch.l0agl1", "Aqara", "Relay T1", "SSM-U02")],
        schema: SchemaKind::SpecBased,
        mappings: RELAY_T1_SPEC,
    },
    CatalogEntry {
        models: &[model("lumi.switch.n0agl1", "Aqara", "Relay T1", "SSM-U01")],
        schema: SchemaKind::SpecBased,
        mappings: RELAY_T1_N_SPEC,
    },
];
