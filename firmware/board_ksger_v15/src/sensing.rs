//! Tip, cold junction and supply measurements (using ADC).

use biquad::{self, Biquad, DirectForm2Transposed, ToHertz};
use defmt::trace;
use embassy_stm32::adc::Adc;
use embassy_stm32::{Peri, peripherals};
use embassy_time::Timer;
use ironctl::hal::Sensors;
use ironctl::settings::TemperatureUnit;
use micromath::F32Ext;
use uom::si::electric_potential::volt;
use uom::si::electrical_resistance::ohm;
use uom::si::f32::{ElectricPotential, ElectricalResistance, Ratio, ThermodynamicTemperature};
use uom::si::ratio::ratio;
use uom::si::thermodynamic_temperature::{degree_celsius, degree_fahrenheit, kelvin};

/// ADC max. value (12 bit).
pub const ADC_MAX: f32 = 4095.0;
/// The ADC reference (analog supply) voltage.
pub const ANALOG_SUPPLY_V: f32 = 3.3;
/// The number of conversions that are averaged per reading.
const OVERSAMPLING: u32 = 4;

/// The ratio of the supply voltage divider.
const VOLTAGE_DIVIDER_RATIO: f32 = 11.0;

/// The NTC's B25/100 constant in K.
const NTC_BETA_K: f32 = 3625.0;
/// The NTC's resistance at 25 °C.
const NTC_R25_OHM: f32 = 10_000.0;
/// The NTC's pull-up resistance (to the analog supply).
const NTC_PULLUP_OHM: f32 = 10_000.0;
/// 25 °C in K.
const T25_K: f32 = 298.15;

/// The nominal rate of tip readings (the default read period of 200 ms).
const TIP_SAMPLE_RATE_HZ: f32 = 5.0;
/// The cut-off frequency of the tip reading low-pass filter.
const TIP_FILTER_CUTOFF_HZ: f32 = 1.0;

/// The ambient temperature at which tips are calibrated.
const CALIBRATION_AMBIENT_DEG_C: f32 = 25.0;

/// Convert an ADC value to measured voltage.
fn adc_value_to_potential(value: u16) -> ElectricPotential {
    ElectricPotential::new::<volt>(ANALOG_SUPPLY_V * (value as f32) / ADC_MAX)
}

/// A tip calibration, by raw readings at 250 °C, 350 °C and 450 °C.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct TipCalibration {
    /// Pairs of (temperature in °C, ADC reading), in ascending order.
    points: [(f32, f32); 3],
}

impl TipCalibration {
    /// Create a calibration from the readings at 250 °C, 350 °C and 450 °C.
    pub const fn new(cal_250: u16, cal_350: u16, cal_450: u16) -> Self {
        Self {
            points: [
                (250.0, cal_250 as f32),
                (350.0, cal_350 as f32),
                (450.0, cal_450 as f32),
            ],
        }
    }

    /// The calibration segment to use for interpolation, selected by `select`.
    fn segment(&self, select: impl Fn((f32, f32)) -> bool) -> ((f32, f32), (f32, f32)) {
        if select(self.points[1]) {
            (self.points[0], self.points[1])
        } else {
            (self.points[1], self.points[2])
        }
    }

    /// The tip temperature in °C for an ADC reading (at calibration ambient).
    ///
    /// Piecewise linear, extrapolating beyond the calibrated range.
    pub fn temperature_c(&self, reading: f32) -> f32 {
        let ((t0, a0), (t1, a1)) = self.segment(|(_, adc)| reading < adc);
        if a1 == a0 {
            return t0;
        }

        t0 + (reading - a0) * (t1 - t0) / (a1 - a0)
    }

    /// The ADC reading for a tip temperature in °C (at calibration ambient).
    pub fn reading(&self, temperature_c: f32) -> f32 {
        let ((t0, a0), (t1, a1)) = self.segment(|(temperature, _)| temperature_c < temperature);

        a0 + (temperature_c - t0) * (a1 - a0) / (t1 - t0)
    }
}

impl Default for TipCalibration {
    fn default() -> Self {
        Self::new(1100, 1200, 1300)
    }
}

/// The NTC temperature, from its ADC reading (Beta model).
fn ntc_temperature(value: u16) -> ThermodynamicTemperature {
    let value = (value as f32).clamp(1.0, ADC_MAX - 1.0);

    let pullup = ElectricalResistance::new::<ohm>(NTC_PULLUP_OHM);
    let resistance = pullup * Ratio::new::<ratio>(value / (ADC_MAX - value));
    let r25 = ElectricalResistance::new::<ohm>(NTC_R25_OHM);

    let inverse_temperature_k = 1.0 / T25_K + (resistance / r25).get::<ratio>().ln() / NTC_BETA_K;
    ThermodynamicTemperature::new::<kelvin>(1.0 / inverse_temperature_k)
}

/// Express a temperature in a unit.
fn in_unit(temperature: ThermodynamicTemperature, unit: TemperatureUnit) -> f32 {
    match unit {
        TemperatureUnit::Celsius => temperature.get::<degree_celsius>(),
        TemperatureUnit::Fahrenheit => temperature.get::<degree_fahrenheit>(),
    }
}

/// One set of raw readings.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct AdcSample {
    /// The tip thermocouple.
    pub tip: u16,
    /// The cold junction NTC.
    pub ntc: u16,
    /// The supply voltage divider.
    pub supply: u16,
}

/// The ADC and its inputs.
pub struct AdcInputs {
    /// The ADC.
    pub adc: Adc<'static, peripherals::ADC1>,
    /// The tip thermocouple amplifier (CH1).
    pub pin_tip: Peri<'static, peripherals::PA1>,
    /// The cold junction NTC (CH3).
    pub pin_ntc: Peri<'static, peripherals::PA3>,
    /// The supply voltage divider (CH4).
    pub pin_supply: Peri<'static, peripherals::PA4>,
}

impl AdcInputs {
    /// Take an averaged reading of all inputs.
    ///
    /// The heater must be off while sampling the tip.
    pub async fn sample(&mut self) -> AdcSample {
        let mut sums = [0u32; 3];

        for _ in 0..OVERSAMPLING {
            sums[0] += self.adc.read(&mut self.pin_tip).await as u32;
            sums[1] += self.adc.read(&mut self.pin_ntc).await as u32;
            sums[2] += self.adc.read(&mut self.pin_supply).await as u32;
            Timer::after_micros(10).await;
        }

        let sample = AdcSample {
            tip: (sums[0] / OVERSAMPLING) as u16,
            ntc: (sums[1] / OVERSAMPLING) as u16,
            supply: (sums[2] / OVERSAMPLING) as u16,
        };
        trace!("ADC sample: {}", sample);

        sample
    }
}

/// Filtered readings, and their conversion to temperatures and voltage.
pub struct Sensing {
    /// A low-pass filter for tip readings.
    tip_filter: DirectForm2Transposed<f32>,
    /// The filtered tip reading.
    tip_average: u16,
    /// The last tip reading.
    tip_raw: u16,
    /// The last cold junction reading.
    ntc_raw: u16,
    /// The last supply voltage reading.
    supply_raw: u16,
    /// The calibration of the inserted tip.
    calibration: TipCalibration,
    /// The system temperature unit.
    unit: TemperatureUnit,
}

impl Sensing {
    /// Create sensing for a tip calibration.
    pub fn new(calibration: TipCalibration) -> Result<Self, biquad::Errors> {
        let coefficients = biquad::Coefficients::<f32>::from_params(
            biquad::Type::LowPass,
            TIP_SAMPLE_RATE_HZ.hz(),
            TIP_FILTER_CUTOFF_HZ.hz(),
            biquad::Q_BUTTERWORTH_F32,
        )?;

        Ok(Self {
            tip_filter: DirectForm2Transposed::<f32>::new(coefficients),
            tip_average: 0,
            tip_raw: 0,
            ntc_raw: (ADC_MAX / 2.0) as u16,
            supply_raw: 0,
            calibration,
            unit: TemperatureUnit::Celsius,
        })
    }

    /// Feed new readings.
    pub fn update(&mut self, sample: AdcSample) {
        self.tip_raw = sample.tip;
        self.tip_average = self.tip_filter.run(sample.tip as f32).clamp(0.0, ADC_MAX) as u16;
        self.ntc_raw = sample.ntc;
        self.supply_raw = sample.supply;
    }

    /// Set the unit of reported temperatures.
    pub fn set_unit(&mut self, unit: TemperatureUnit) {
        self.unit = unit;
    }

    /// The deviation of the cold junction from the calibration ambient, in K.
    fn ambient_offset_k(&self) -> f32 {
        ntc_temperature(self.ntc_raw).get::<degree_celsius>() - CALIBRATION_AMBIENT_DEG_C
    }
}

impl Sensors for Sensing {
    fn tip_temperature(&mut self) -> i16 {
        let temperature_c = self.calibration.temperature_c(self.tip_average as f32) + self.ambient_offset_k();
        let temperature = ThermodynamicTemperature::new::<degree_celsius>(temperature_c);

        in_unit(temperature, self.unit).round() as i16
    }

    fn tip_average(&self) -> u16 {
        self.tip_average
    }

    fn tip_raw(&self) -> u16 {
        self.tip_raw
    }

    fn cold_junction_x10(&self, unit: TemperatureUnit) -> i16 {
        (in_unit(ntc_temperature(self.ntc_raw), unit) * 10.0).round() as i16
    }

    fn supply_voltage_x10(&self) -> u16 {
        let potential = VOLTAGE_DIVIDER_RATIO * adc_value_to_potential(self.supply_raw);

        (potential.get::<volt>() * 10.0).round() as u16
    }

    fn to_sensor_scale(&self, temperature: u16) -> u16 {
        let temperature_c = match self.unit {
            TemperatureUnit::Celsius => temperature as f32,
            TemperatureUnit::Fahrenheit => {
                ThermodynamicTemperature::new::<degree_fahrenheit>(temperature as f32).get::<degree_celsius>()
            }
        };

        let reading = self.calibration.reading(temperature_c - self.ambient_offset_k());
        reading.clamp(0.0, ADC_MAX) as u16
    }
}
