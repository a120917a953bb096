use proptest::prelude::*;
use soil_ecohydro::flow::{
    DrainageParams, SoilWaterState, infiltrate_water_high, infiltrate_water_low, remove_from_soil,
};
use soil_ecohydro::soil_hydra::{LayerTexture, SoilProfile};
use soil_ecohydro::vegetation::PerVeg;

fn texture(width: f64, sand: f64, clay: f64, impermeability: f64) -> LayerTexture {
    LayerTexture {
        width,
        bulk_density: 1.4,
        gravel: 0.0,
        sand,
        clay,
        impermeability,
        evap_coeff: 0.5,
        transp_coeff: PerVeg::from_fn(|_| 0.25),
        transp_region: PerVeg::from_fn(|_| 1),
        init_temp: 5.0,
    }
}

prop_compose! {
    fn profile()(
        layers in prop::collection::vec(
            (1.0..40.0f64, 0.1..0.7f64, 0.05..0.3f64, 0.0..0.5f64),
            1..8,
        )
    ) -> SoilProfile {
        let textures = layers
            .into_iter()
            .map(|(w, sand, clay, imp)| texture(w, sand, clay, imp))
            .collect();
        SoilProfile::new(textures, 30.0).unwrap()
    }
}

prop_compose! {
    // A profile with water contents anywhere between the lower limit and saturation
    fn wetted()(p in profile())(
        fracs in prop::collection::vec(0.0..=1.0f64, p.n_layers()),
        frozen in prop::collection::vec(any::<bool>(), p.n_layers()),
        p in Just(p),
    ) -> (SoilProfile, Vec<f64>, Vec<bool>) {
        let swc = p
            .layers
            .iter()
            .zip(&fracs)
            .map(|(l, f)| l.swc_min + f * (l.swc_sat - l.swc_min))
            .collect();
        (p, swc, frozen)
    }
}

proptest! {
    #[test]
    fn high_infiltration_conserves_water_and_respects_saturation(
        (p, swc, frozen) in wetted(),
        ppt in 0.0..20.0f64,
    ) {
        let mut state = SoilWaterState::new(swc);
        let before = state.total();
        infiltrate_water_high(&mut state, ppt, &p, &frozen);

        let after = state.total() + state.drain_out + state.standing_water;
        prop_assert!((before + ppt - after).abs() < 1e-9);
        prop_assert!(state.standing_water >= 0.0);
        for (w, l) in state.swc.iter().zip(&p.layers) {
            prop_assert!(*w <= l.swc_sat + 1e-9);
        }
    }

    #[test]
    fn low_infiltration_conserves_water_and_keeps_lower_limit(
        (p, swc, frozen) in wetted(),
    ) {
        let mut state = SoilWaterState::new(swc);
        let before = state.total();
        infiltrate_water_low(&mut state, &DrainageParams::default(), &p, &frozen);

        let after = state.total() + state.drain_out + state.standing_water;
        prop_assert!((before - after).abs() < 1e-9);
        prop_assert!(state.drain_out >= 0.0);
        for (w, l) in state.swc.iter().zip(&p.layers) {
            prop_assert!(*w >= l.swc_min - 1e-9);
            prop_assert!(*w <= l.swc_sat + 1e-9);
        }
    }

    #[test]
    fn removal_is_bounded_by_rate_and_available_water(
        (p, swc, frozen) in wetted(),
        rate in 0.0..2.0f64,
    ) {
        let n = p.n_layers();
        let coeff = vec![0.25; n];
        let mut after = swc.clone();
        let mut qty = vec![0.0; n];
        let removed = remove_from_soil(&mut after, &mut qty, &coeff, rate, &p, &frozen);

        prop_assert!(removed <= rate + 1e-12);
        prop_assert!((removed - qty.iter().sum::<f64>()).abs() < 1e-12);
        for i in 0..n {
            prop_assert!(after[i] >= p.layers[i].swc_min - 1e-12);
            prop_assert!((swc[i] - after[i] - qty[i]).abs() < 1e-12);
            if frozen[i] {
                prop_assert_eq!(qty[i], 0.0);
            }
        }
    }
}
