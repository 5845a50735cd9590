pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/cpro/login/validateLogin.json";
pub const INVERTER_LIST: &Endpoint = "/cpro/epc/plantDevice/inverterListAjax.json";
pub const INVERTER_DETAIL: &Endpoint = "/cpro/device/inverter/goDetailAjax.json";
